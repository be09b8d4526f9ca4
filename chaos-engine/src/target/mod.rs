//! Target abstraction for replay-chaos.
//!
//! The system under test is reached through one operation: hand it a record
//! and learn whether it processed it. Everything the engine does funnels
//! through [`ReplayTarget::process`].
//!
//! # Example
//!
//! ```ignore
//! let target = MockTarget::new();
//! target.fail_every(3);
//! target.process(&record).await?;
//! assert_eq!(target.call_count(), 1);
//! ```

mod mock;

pub use mock::MockTarget;

use async_trait::async_trait;
use chaos_types::Value;
use std::time::Duration;
use thiserror::Error;

/// Target errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    /// Target refused or failed to process the record.
    #[error("target rejected record: {0}")]
    Rejected(String),

    /// Target did not answer in time.
    #[error("target timed out after {0:?}")]
    Timeout(Duration),

    /// Target is not reachable.
    #[error("target unavailable: {0}")]
    Unavailable(String),

    /// State reset failed.
    #[error("target reset failed: {0}")]
    ResetFailed(String),
}

/// A system under chaos test.
///
/// Implementations must tolerate concurrent calls; the engine drives one
/// target from many workers and scenario tasks at once.
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Process one record.
    async fn process(&self, record: &Value) -> Result<(), TargetError>;

    /// Reset state between test phases. Defaults to a no-op.
    async fn reset(&self) -> Result<(), TargetError> {
        Ok(())
    }
}
