//! Lightweight mode.
//!
//! Runs the replay engine one scenario at a time inside a resource budget.
//! Memory/CPU are sampled before every scenario and a scenario is skipped,
//! not failed, when the process is over budget. Resource-intensive scenarios
//! are never scheduled.

mod monitor;
mod profile;

pub use monitor::{
    BudgetCheck, LightweightMetrics, ResourceMonitor, ResourceSample, ResourceSampler,
    SystemSampler,
};
pub use profile::{detect_total_memory_mb, ResourceProfile, Workload};

use crate::engine::ChaosReplayEngine;
use crate::error::EngineError;
use crate::target::ReplayTarget;
use chaos_config::{ChaosConfig, UnitError};
use chaos_core::SpanMutator;
use chaos_types::{ChaosTestResult, ScenarioKind, Value};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Completed scenarios between result compactions.
pub const COMPACTION_INTERVAL: u64 = 5;

/// A scenario the runner did not execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedScenario {
    /// Scenario skipped.
    pub scenario: ScenarioKind,
    /// Why.
    pub reason: String,
}

/// Outcome of a lightweight run.
#[derive(Debug, Clone, Serialize)]
pub struct LightweightReport {
    /// Run name.
    pub test_name: String,
    /// One result per executed scenario. Older results lose their events at
    /// each compaction.
    pub results: Vec<ChaosTestResult>,
    /// Scenarios skipped for budget.
    pub skipped: Vec<SkippedScenario>,
    /// Requested scenarios dropped as resource-intensive.
    pub excluded: Vec<ScenarioKind>,
    /// Run counters.
    pub metrics: LightweightMetrics,
    /// Weighted efficiency in `[0.0, 1.0]`.
    pub efficiency_score: f64,
    /// Tuning advice.
    pub recommendations: Vec<String>,
}

/// Split requested scenarios into those lightweight mode runs and those it excludes.
pub fn lightweight_scenarios(
    requested: &[ScenarioKind],
) -> (Vec<ScenarioKind>, Vec<ScenarioKind>) {
    requested
        .iter()
        .copied()
        .partition(|kind| !kind.is_resource_intensive())
}

/// Efficiency score: completion rate 0.4, memory headroom 0.4, violation
/// penalty 0.2.
pub fn efficiency_score(metrics: &LightweightMetrics, memory_limit_mb: u64) -> f64 {
    let completion = metrics.completion_rate();
    let headroom = if memory_limit_mb == 0 {
        0.0
    } else {
        (1.0 - metrics.peak_memory_mb / memory_limit_mb as f64).clamp(0.0, 1.0)
    };
    let planned = metrics.tests_executed + metrics.tests_skipped;
    let violations = if planned == 0 {
        1.0
    } else {
        1.0 - (metrics.resource_violations as f64 / planned as f64).min(1.0)
    };
    (0.4 * completion + 0.4 * headroom + 0.2 * violations).clamp(0.0, 1.0)
}

/// Budgeted, sequential front end to [`ChaosReplayEngine`].
#[derive(Debug)]
pub struct LightweightRunner {
    engine: ChaosReplayEngine,
    monitor: ResourceMonitor,
}

impl LightweightRunner {
    /// Runner with the profile described by `[lightweight_mode]`.
    pub fn new(config: ChaosConfig, target: Arc<dyn ReplayTarget>) -> Result<Self, UnitError> {
        let profile = ResourceProfile::from_config(&config.lightweight_mode)?;
        Ok(Self::with_profile(config, target, profile))
    }

    /// Runner with an explicit profile.
    pub fn with_profile(
        config: ChaosConfig,
        target: Arc<dyn ReplayTarget>,
        profile: ResourceProfile,
    ) -> Self {
        Self {
            engine: ChaosReplayEngine::new(config, target),
            monitor: ResourceMonitor::new(profile),
        }
    }

    /// Replace the resource sampler.
    pub fn with_sampler(mut self, sampler: Box<dyn ResourceSampler>) -> Self {
        let profile = self.monitor.profile().clone();
        self.monitor = ResourceMonitor::with_sampler(profile, sampler);
        self
    }

    /// Budget in force.
    pub fn profile(&self) -> &ResourceProfile {
        self.monitor.profile()
    }

    /// Underlying engine.
    pub fn engine(&self) -> &ChaosReplayEngine {
        &self.engine
    }

    /// Run the configured scenario list.
    pub async fn run_configured(
        &mut self,
        test_name: &str,
    ) -> Result<LightweightReport, EngineError> {
        let scenarios = self.engine.config().chaos_replay.scenarios.clone();
        self.run(test_name, &scenarios, None).await
    }

    /// Run each scenario in turn, one engine run per scenario.
    ///
    /// `test_data` is capped at the profile's batch size; it defaults to a
    /// valid trace of that many spans.
    pub async fn run(
        &mut self,
        test_name: &str,
        scenarios: &[ScenarioKind],
        test_data: Option<Vec<Value>>,
    ) -> Result<LightweightReport, EngineError> {
        let profile = self.monitor.profile().clone();
        let (scenarios, excluded) = lightweight_scenarios(scenarios);
        if !excluded.is_empty() {
            info!(excluded = ?excluded, "resource-intensive scenarios excluded");
        }
        let batch = profile.batch_size.max(1);
        let data = match test_data {
            Some(mut records) => {
                records.truncate(batch);
                records
            }
            None => SpanMutator::new(rand::random()).valid_trace(batch - 1),
        };

        let mut metrics = LightweightMetrics::start();
        let mut results: Vec<ChaosTestResult> = Vec::new();
        let mut skipped = Vec::new();

        for kind in scenarios {
            match self.monitor.check() {
                BudgetCheck::Exceeded { sample, reason } => {
                    warn!(scenario = %kind, reason = %reason, "over budget, skipping scenario");
                    metrics.memory_used_mb = sample.memory_mb;
                    metrics.tests_skipped += 1;
                    metrics.resource_violations += 1;
                    skipped.push(SkippedScenario {
                        scenario: kind,
                        reason,
                    });
                    continue;
                }
                BudgetCheck::Within(sample) => metrics.memory_used_mb = sample.memory_mb,
            }

            let result = self
                .engine
                .run_chaos_test(
                    &format!("{test_name}/{kind}"),
                    &[kind],
                    profile.test_duration,
                    Some(data.clone()),
                    1,
                )
                .await?;
            metrics.tests_executed += 1;
            metrics.errors += result.error_count;
            results.push(result);

            if metrics.tests_executed % COMPACTION_INTERVAL == 0 {
                results.iter_mut().for_each(ChaosTestResult::compact);
                debug!(completed = metrics.tests_executed, "compacted results");
            }
        }

        metrics.memory_used_mb = self.monitor.sample().memory_mb;
        metrics.peak_memory_mb = self.monitor.peak_memory_mb();
        metrics.finish();
        let efficiency_score = efficiency_score(&metrics, profile.memory_limit_mb);
        let recommendations = recommendations(&metrics, &profile, &excluded);
        info!(
            test = test_name,
            executed = metrics.tests_executed,
            skipped = metrics.tests_skipped,
            peak_mb = metrics.peak_memory_mb,
            efficiency = efficiency_score,
            "lightweight run finished"
        );

        Ok(LightweightReport {
            test_name: test_name.to_string(),
            results,
            skipped,
            excluded,
            metrics,
            efficiency_score,
            recommendations,
        })
    }
}

fn recommendations(
    metrics: &LightweightMetrics,
    profile: &ResourceProfile,
    excluded: &[ScenarioKind],
) -> Vec<String> {
    let mut out = Vec::new();
    let limit = profile.memory_limit_mb as f64;
    let usage = if limit > 0.0 {
        metrics.peak_memory_mb / limit
    } else {
        1.0
    };

    if metrics.resource_violations > 0 {
        if profile.memory_limit_mb > ResourceProfile::ultra_light().memory_limit_mb {
            out.push(format!(
                "{} scenarios skipped over budget; reduce to the ultra-light profile or raise memory_limit",
                metrics.resource_violations
            ));
        } else {
            out.push(format!(
                "{} scenarios skipped over budget; raise memory_limit above {}MB",
                metrics.resource_violations, profile.memory_limit_mb
            ));
        }
    } else if usage > 0.8 {
        out.push(format!(
            "memory peaked at {:.0}% of budget; consider the next larger profile",
            usage * 100.0
        ));
    } else if usage < 0.25 && metrics.tests_executed > 0 {
        out.push("memory stayed under a quarter of budget; a smaller profile would suffice".into());
    }
    if !excluded.is_empty() {
        let names: Vec<&str> = excluded.iter().map(ScenarioKind::as_str).collect();
        out.push(format!(
            "run {} with the full engine; lightweight mode excludes them",
            names.join(", ")
        ));
    }
    if metrics.errors > 0 {
        out.push(format!(
            "target failed {} operations; inspect the per-scenario results",
            metrics.errors
        ));
    }
    out
}
