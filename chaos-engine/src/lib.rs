//! # chaos-engine
//!
//! Orchestration for the replay-chaos harness.
//!
//! - [`ChaosReplayEngine`] - Concurrent replay workers plus scheduled scenarios
//!   against one [`ReplayTarget`], scored into a [`ChaosTestResult`](chaos_types::ChaosTestResult)
//! - [`ScenarioRegistry`] - Handler per [`ScenarioKind`](chaos_types::ScenarioKind),
//!   overridable with custom [`ScenarioHandler`]s
//! - [`LightweightRunner`] - Sequential, budgeted runs with a [`ResourceMonitor`]
//! - [`ChaosReport`] - JSON and plain-text reports
//! - [`MockTarget`] - Configurable target for tests
//!
//! ## Example
//!
//! ```ignore
//! let target = Arc::new(MockTarget::new());
//! let engine = ChaosReplayEngine::new(ChaosConfig::default(), target);
//! let result = engine
//!     .run_chaos_test("smoke", &[ScenarioKind::MalformedSpans], Duration::from_secs(2), None, 4)
//!     .await?;
//! assert!(result.resilience_score >= 0.9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod lightweight;
pub mod metrics;
pub mod report;
pub mod scenarios;
pub mod target;

pub use engine::{ChaosReplayEngine, EngineState};
pub use error::EngineError;
pub use lightweight::{
    BudgetCheck, LightweightMetrics, LightweightReport, LightweightRunner, ResourceMonitor,
    ResourceProfile, ResourceSample, ResourceSampler, SkippedScenario, SystemSampler, Workload,
};
pub use metrics::MetricsCollector;
pub use report::ChaosReport;
pub use scenarios::{ScenarioCtx, ScenarioHandler, ScenarioOutcome, ScenarioRegistry, ScenarioSettings};
pub use target::{MockTarget, ReplayTarget, TargetError};
