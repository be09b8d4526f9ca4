//! Error types for fault injection.

use thiserror::Error;

/// Harness errors raised while injecting a fault.
///
/// These mean the injection itself could not be carried out. The synthetic
/// failure a fault inflicts is a [`SimulatedFault`](chaos_types::SimulatedFault),
/// not one of these.
#[derive(Debug, Error)]
pub enum FaultError {
    /// Probability outside `[0.0, 1.0]`.
    #[error("fault probability {0} outside [0, 1]")]
    InvalidProbability(f64),

    /// Memory fault larger than the injector allows.
    #[error("memory fault of {requested_mb}MB exceeds cap of {cap_mb}MB")]
    MemoryCapExceeded {
        /// Requested allocation.
        requested_mb: usize,
        /// Configured cap.
        cap_mb: usize,
    },

    /// A blocking fault worker panicked or was cancelled.
    #[error("fault worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// Chaos monkey configured without targets.
    #[error("chaos monkey has no targets")]
    NoTargets,

    /// Chaos monkey started twice.
    #[error("chaos monkey already running")]
    AlreadyRunning,
}
