//! Core library for the `harnessgen` test-harness generator.
//!
//! The crate rebuilds a C/C++ project's link DAG into an instrumented test
//! binary: `core::build` is the read-only view over the user's recorded
//! compile and link commands, `core::types` reconstructs a typed model of
//! the project's aggregate types from the parsing frontend's AST, and
//! `core::plan` emits the native build plan that drives recompilation.

pub mod core;
pub mod driver;
