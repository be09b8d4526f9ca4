//! Error types for the replay engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a run from starting or a report from being written.
///
/// Failures inside a run (target errors, generator errors, faults) never
/// surface here; they are recorded in the run's events and metrics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A run is already in progress on this engine.
    #[error("a chaos run is already in progress")]
    AlreadyRunning,

    /// Concurrency of zero requested.
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    /// Report could not be written.
    #[error("failed to write report {path}: {source}")]
    ReportWrite {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Report could not be serialized.
    #[error("failed to serialize report: {0}")]
    ReportSerialize(#[from] serde_json::Error),
}
