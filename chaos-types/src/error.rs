//! Error types for replay-chaos.

use thiserror::Error;

/// Errors shared by all replay-chaos crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChaosError {
    /// A tag did not name any variant of the expected kind.
    #[error("unknown {kind}: {value}")]
    UnknownKind {
        /// Name of the kind enum.
        kind: &'static str,
        /// The unrecognized tag.
        value: String,
    },

    /// A record cannot be represented as JSON.
    #[error("value is not serializable: {0}")]
    NotSerializable(String),

    /// A record had the wrong shape for the requested operation.
    #[error("unexpected shape: expected {expected}, found {found}")]
    UnexpectedShape {
        /// What the operation needed.
        expected: &'static str,
        /// What it got.
        found: &'static str,
    },
}
