//! Run aggregates and resilience scoring.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::time::serialize_duration_ms;
use crate::{ChaosEvent, ScenarioKind};

/// Recovery time at which the recovery component of the score reaches zero.
pub const DEFAULT_RECOVERY_REFERENCE: Duration = Duration::from_secs(10);

/// Weights for the resilience score.
///
/// Defaults are 0.5 success rate, 0.3 recovery time, 0.2 error density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreWeights {
    /// Weight of the success rate.
    #[serde(default = "default_success_weight")]
    pub success_rate: f64,
    /// Weight of normalized recovery time.
    #[serde(default = "default_recovery_weight")]
    pub recovery: f64,
    /// Weight of normalized error density.
    #[serde(default = "default_error_weight")]
    pub error_density: f64,
    /// Recovery time that scores zero (seconds).
    #[serde(default = "default_recovery_reference_secs")]
    pub recovery_reference_secs: f64,
}

fn default_success_weight() -> f64 {
    0.5
}

fn default_recovery_weight() -> f64 {
    0.3
}

fn default_error_weight() -> f64 {
    0.2
}

fn default_recovery_reference_secs() -> f64 {
    DEFAULT_RECOVERY_REFERENCE.as_secs_f64()
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            success_rate: default_success_weight(),
            recovery: default_recovery_weight(),
            error_density: default_error_weight(),
            recovery_reference_secs: default_recovery_reference_secs(),
        }
    }
}

/// Compute the resilience score.
///
/// Returns 1.0 when nothing was scored. Always in `[0.0, 1.0]`.
pub fn resilience_score(
    event_count: u64,
    error_count: u64,
    recovery_time: Duration,
    weights: &ScoreWeights,
) -> f64 {
    if event_count == 0 {
        return 1.0;
    }
    let errors = error_count.min(event_count) as f64;
    let total = event_count as f64;

    let success_rate = (total - errors) / total;
    let reference = if weights.recovery_reference_secs > 0.0 {
        weights.recovery_reference_secs
    } else {
        default_recovery_reference_secs()
    };
    let recovery = 1.0 - (recovery_time.as_secs_f64() / reference).min(1.0);
    let density = 1.0 - (errors / total).min(1.0);

    let score = weights.success_rate * success_rate
        + weights.recovery * recovery
        + weights.error_density * density;
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// Executed/failed counts for one scenario kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioTally {
    /// Handler invocations.
    pub executed: u64,
    /// Invocations that recorded a failure.
    pub failed: u64,
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    /// Records sent to the target by replay workers.
    pub records_processed: u64,
    /// Records that were mutated before sending.
    pub records_mutated: u64,
    /// Replayed records the target rejected.
    pub record_failures: u64,
    /// Mutations that failed inside the harness.
    pub mutation_failures: u64,
    /// Scenario handlers executed.
    pub scenarios_executed: u64,
    /// Scenario handlers that recorded a failure.
    pub scenario_failures: u64,
    /// Scenario handlers cut off by the run deadline. Not counted as executed.
    pub scenarios_cancelled: u64,
    /// Mean latency of target calls from replay workers.
    pub mean_target_latency_ms: f64,
    /// Per-scenario counts.
    pub per_scenario: BTreeMap<ScenarioKind, ScenarioTally>,
}

/// Aggregate of one chaos run.
#[derive(Debug, Clone, Serialize)]
pub struct ChaosTestResult {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Test name.
    pub test_name: String,
    /// Scenario events, in completion order.
    pub events: Vec<ChaosEvent>,
    /// Wall time of the run.
    #[serde(serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,
    /// Scored operations: scenario executions plus replayed records.
    pub event_count: u64,
    /// Scored operations that failed. Never exceeds `event_count`.
    pub error_count: u64,
    /// `(event_count - error_count) / event_count`, 1.0 when empty.
    pub success_rate: f64,
    /// Mean duration of failed operations.
    #[serde(serialize_with = "serialize_duration_ms")]
    pub recovery_time: Duration,
    /// Weighted resilience score in `[0.0, 1.0]`.
    pub resilience_score: f64,
    /// Detailed counters.
    pub metrics: RunMetrics,
}

impl ChaosTestResult {
    /// Build a result, deriving rate and score from the counts.
    pub fn new(
        test_name: &str,
        events: Vec<ChaosEvent>,
        total_duration: Duration,
        metrics: RunMetrics,
        recovery_time: Duration,
        weights: &ScoreWeights,
    ) -> Self {
        let event_count = metrics.scenarios_executed + metrics.records_processed;
        let error_count = (metrics.scenario_failures + metrics.record_failures).min(event_count);
        let success_rate = if event_count == 0 {
            1.0
        } else {
            (event_count - error_count) as f64 / event_count as f64
        };
        let resilience_score =
            resilience_score(event_count, error_count, recovery_time, weights);

        Self {
            run_id: Uuid::new_v4(),
            test_name: test_name.to_string(),
            events,
            total_duration,
            event_count,
            error_count,
            success_rate,
            recovery_time,
            resilience_score,
            metrics,
        }
    }

    /// Events for one scenario.
    pub fn events_for(&self, scenario: ScenarioKind) -> impl Iterator<Item = &ChaosEvent> {
        self.events.iter().filter(move |e| e.scenario == scenario)
    }

    /// Drop per-event detail, keeping the aggregates.
    pub fn compact(&mut self) {
        self.events.clear();
        self.events.shrink_to_fit();
    }
}
