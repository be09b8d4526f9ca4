//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading configuration.
///
/// [`ConfigLoader`](crate::ConfigLoader) never returns these to callers; it
/// turns them into [`ConfigIssue`](crate::ConfigIssue)s and falls back to
/// defaults. They surface directly only from the strict constructors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// An environment-variable override could not be applied.
    #[error("override {var} rejected: {message}")]
    Override {
        /// Variable name.
        var: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Errors parsing memory and CPU quantities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    /// Empty string.
    #[error("empty quantity")]
    Empty,
    /// Numeric part did not parse.
    #[error("invalid number in {0:?}")]
    InvalidNumber(String),
    /// Suffix not recognized.
    #[error("unknown unit {unit:?} in {input:?}")]
    UnknownUnit {
        /// Full input.
        input: String,
        /// Unrecognized suffix.
        unit: String,
    },
    /// Zero, negative or non-finite.
    #[error("quantity {0:?} must be positive")]
    NonPositive(String),
}
