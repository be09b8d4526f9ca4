//! Assertion helpers for resilience runs.
//!
//! Pure functions over finished results. Each returns an [`AssertionResult`]
//! so a scenario can collect several checks before failing.

use chaos_engine::LightweightReport;
use chaos_types::{ChaosTestResult, ScenarioKind};
use std::time::Duration;

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }

    /// Panic with the details if the check failed.
    pub fn assert_passed(self) {
        assert!(
            self.passed,
            "{}: {}",
            self.description,
            self.failure_details.unwrap_or_default()
        );
    }
}

/// Score in `[0, 1]` and error count within event count.
pub fn assert_result_consistent(result: &ChaosTestResult) -> AssertionResult {
    let description = format!("result {} is internally consistent", result.test_name);
    if !(0.0..=1.0).contains(&result.resilience_score) {
        return AssertionResult::fail(
            &description,
            &format!("score {} outside [0, 1]", result.resilience_score),
        );
    }
    if result.error_count > result.event_count {
        return AssertionResult::fail(
            &description,
            &format!("{} errors for {} events", result.error_count, result.event_count),
        );
    }
    if !(0.0..=1.0).contains(&result.success_rate) {
        return AssertionResult::fail(
            &description,
            &format!("success rate {} outside [0, 1]", result.success_rate),
        );
    }
    AssertionResult::pass(&description)
}

/// Every scheduled scenario recorded exactly one event.
pub fn assert_scenarios_recorded(
    result: &ChaosTestResult,
    scenarios: &[ScenarioKind],
) -> AssertionResult {
    let description = "every scheduled scenario recorded one event";
    for kind in scenarios {
        let count = result.events_for(*kind).count();
        if count != 1 {
            return AssertionResult::fail(
                description,
                &format!("{kind} recorded {count} events"),
            );
        }
    }
    AssertionResult::pass(description)
}

/// Wall time stayed within `duration` plus `slack`.
pub fn assert_respects_deadline(
    result: &ChaosTestResult,
    duration: Duration,
    slack: Duration,
) -> AssertionResult {
    let description = format!("run finished within {:?} (+{:?})", duration, slack);
    if result.total_duration > duration + slack {
        return AssertionResult::fail(
            &description,
            &format!("took {:?}", result.total_duration),
        );
    }
    AssertionResult::pass(&description)
}

/// No resource-intensive scenario ran in a lightweight report.
pub fn assert_no_resource_intensive(report: &LightweightReport) -> AssertionResult {
    let description = "lightweight run excluded resource-intensive scenarios";
    for result in &report.results {
        if let Some((kind, _)) = result
            .metrics
            .per_scenario
            .iter()
            .find(|(kind, _)| kind.is_resource_intensive())
        {
            return AssertionResult::fail(description, &format!("{kind} was executed"));
        }
    }
    AssertionResult::pass(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_types::{RunMetrics, ScoreWeights};

    fn result(records: u64, failures: u64) -> ChaosTestResult {
        ChaosTestResult::new(
            "t",
            Vec::new(),
            Duration::from_millis(100),
            RunMetrics {
                records_processed: records,
                record_failures: failures,
                ..Default::default()
            },
            Duration::ZERO,
            &ScoreWeights::default(),
        )
    }

    #[test]
    fn consistent_results_pass() {
        assert!(assert_result_consistent(&result(10, 2)).passed);
        assert!(assert_result_consistent(&result(0, 0)).passed);
    }

    #[test]
    fn missing_scenarios_fail() {
        let check = assert_scenarios_recorded(&result(1, 0), &[ScenarioKind::ClockSkew]);
        assert!(!check.passed);
        assert!(check.failure_details.unwrap().contains("clock_skew"));
    }

    #[test]
    fn deadline_check() {
        let r = result(1, 0);
        let within = assert_respects_deadline(&r, Duration::from_millis(50), Duration::from_millis(60));
        assert!(within.passed);
        assert!(!assert_respects_deadline(&r, Duration::from_millis(10), Duration::ZERO).passed);
    }
}
