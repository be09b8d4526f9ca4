//! # chaos-types
//!
//! Shared types for the replay-chaos fault-injection harness.
//!
//! This crate provides the foundational types used across all replay-chaos crates:
//! - [`Value`] - The keyed/nested record that generators corrupt and targets consume
//! - [`MutationKind`], [`SpanMalformationKind`], [`GorkCategory`], [`FaultKind`],
//!   [`ScenarioKind`] - Closed tag sets with stable snake_case names
//! - [`MutationResult`], [`SpanMalformation`], [`GorkResult`], [`FaultInjectionResult`]
//!   - Per-call results produced by the generators and the injector
//! - [`ChaosEvent`], [`ChaosTestResult`] - Scenario executions and run aggregates
//! - [`ChaosError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

#[macro_use]
mod macros;

mod error;
mod fault;
mod gork;
mod mutation;
mod result;
mod scenario;
mod span;
pub mod time;
mod value;

pub use error::ChaosError;
pub use fault::{FaultFamily, FaultInjectionResult, FaultKind, FaultParams, SimulatedFault};
pub use gork::{ExpectedFailure, GorkCategory, GorkFamily, GorkResult, Severity};
pub use mutation::{MutationKind, MutationResult};
pub use result::{
    resilience_score, ChaosTestResult, RunMetrics, ScenarioTally, ScoreWeights,
    DEFAULT_RECOVERY_REFERENCE,
};
pub use scenario::{ChaosEvent, ScenarioKind};
pub use span::{SpanMalformation, SpanMalformationKind};
pub use value::Value;
