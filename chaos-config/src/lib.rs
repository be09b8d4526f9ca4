//! # chaos-config
//!
//! Configuration for the replay-chaos harness.
//!
//! - [`ChaosConfig`] - Typed TOML sections for every component plus named environments
//! - [`ConfigLoader`] - File + `CHAOS_<SECTION>_<FIELD>` overrides, never fails,
//!   falls back to defaults and reports [`ConfigIssue`]s
//! - [`ScenarioCompatibility`] - Pairwise conflict matrix and risk score for scenario sets
//! - [`parse_memory_mb`], [`parse_cpu_cores`] - Resource quantity parsing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compat;
pub mod config;
pub mod environment;
pub mod error;
pub mod loader;
pub mod units;
pub mod validate;

pub use compat::{CompatibilityReport, ScenarioCompatibility, ScenarioConflict};
pub use config::{
    ChaosConfig, ChaosReplayConfig, GorkGenerationConfig, LightweightModeConfig, MutationConfig,
    ProfileName, ReportFormat, ReportingConfig, ScoringConfig, SpanMutationConfig,
};
pub use environment::{builtin_environments, EnvironmentConfig, DANGEROUS_SCENARIOS};
pub use error::{ConfigError, UnitError};
pub use loader::{ConfigLoader, ConfigSource, LoadedConfig};
pub use units::{parse_cpu_cores, parse_memory_mb};
pub use validate::{ConfigIssue, IssueSeverity};
