//! Driver layer wiring the core components into end-to-end operations.

pub mod plan;
