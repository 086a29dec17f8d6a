//! Error taxonomy for database access and plan emission.
//!
//! Failures abort the current plan or resolution pass; the core performs no
//! recovery of its own. Type-name collisions are a warning diagnostic, not
//! an error, and are reported through the `tracing` side band.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::build::command::CommandCategory;
use crate::core::build::database::LinkKind;

/// Failures while loading or validating the compilation database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("record for {0} has an empty command line")]
    EmptyCommand(PathBuf),

    #[error("record for {0} names no output file")]
    MissingOutput(PathBuf),

    #[error("link unit {unit}: command category {category:?} disagrees with output kind {kind:?}")]
    KindMismatch {
        unit: PathBuf,
        category: CommandCategory,
        kind: LinkKind,
    },
}

/// Failures during native-plan emission.
///
/// Database load errors pass through transparently; everything else is a
/// condition the emitter itself detects.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown build unit: {0}")]
    UnknownUnit(PathBuf),

    #[error("cannot resolve a bundled toolchain for {0}")]
    ToolchainUnresolved(PathBuf),

    #[error("unsupported link unit {unit}: {reason}")]
    UnsupportedUnit { unit: PathBuf, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
