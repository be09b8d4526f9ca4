//! Configuration validation.
//!
//! Validation never fails; it returns every problem it finds as a
//! [`ConfigIssue`].

use crate::compat::ScenarioCompatibility;
use crate::config::ChaosConfig;
use crate::environment::{
    CI, CI_MAX_PARALLEL_WORKERS, CI_MAX_TIMEOUT_MULTIPLIER, DANGEROUS_SCENARIOS, PRODUCTION,
};
use crate::units::{parse_cpu_cores, parse_memory_mb};
use serde::Serialize;
use std::fmt;

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Suspicious but usable.
    Warning,
    /// Invalid; the affected setting should not be trusted.
    Error,
}

/// One configuration problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigIssue {
    /// Severity.
    pub severity: IssueSeverity,
    /// Dotted path of the offending setting.
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl ConfigIssue {
    /// An error-level issue.
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    /// A warning-level issue.
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for error-level issues.
    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
        };
        write!(f, "{level}: {}: {}", self.path, self.message)
    }
}

#[derive(Default)]
struct Issues(Vec<ConfigIssue>);

impl Issues {
    fn rate(&mut self, path: &str, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            self.0
                .push(ConfigIssue::error(path, format!("{value} is outside [0, 1]")));
        }
    }

    fn positive(&mut self, path: &str, value: u64) {
        if value == 0 {
            self.0.push(ConfigIssue::error(path, "must be greater than zero"));
        }
    }

    fn memory(&mut self, path: &str, value: &str) {
        if let Err(e) = parse_memory_mb(value) {
            self.0.push(ConfigIssue::error(path, e.to_string()));
        }
    }

    fn cpu(&mut self, path: &str, value: &str) {
        if let Err(e) = parse_cpu_cores(value) {
            self.0.push(ConfigIssue::error(path, e.to_string()));
        }
    }
}

impl ChaosConfig {
    /// Check every setting and return the problems found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Issues::default();

        issues.rate("mutation.mutation_rate", self.mutation.mutation_rate);
        issues.positive("mutation.max_depth", self.mutation.max_depth as u64);

        let replay = &self.chaos_replay;
        issues.rate("chaos_replay.chaos_intensity", replay.chaos_intensity);
        issues.positive("chaos_replay.concurrency", replay.concurrency as u64);
        issues.positive("chaos_replay.duration_secs", replay.duration_secs);
        issues.positive("chaos_replay.record_delay_ms", replay.record_delay_ms);
        issues.positive("chaos_replay.target_timeout_ms", replay.target_timeout_ms);
        issues.positive("chaos_replay.fault_duration_ms", replay.fault_duration_ms);
        if replay.scenarios.is_empty() {
            issues.0.push(ConfigIssue::warning(
                "chaos_replay.scenarios",
                "no scenarios scheduled; runs will only replay records",
            ));
        }

        issues.rate(
            "span_mutation.malformation_intensity",
            self.span_mutation.malformation_intensity,
        );
        issues.positive(
            "span_mutation.trace_span_count",
            self.span_mutation.trace_span_count as u64,
        );
        issues.rate("gork_generation.corruption_rate", self.gork_generation.corruption_rate);
        issues.positive("gork_generation.bomb_size_mb", self.gork_generation.bomb_size_mb as u64);

        if self.reporting.formats.is_empty() {
            issues.0.push(ConfigIssue::warning("reporting.formats", "no report formats selected"));
        }

        let light = &self.lightweight_mode;
        if let Some(memory) = &light.memory_limit {
            issues.memory("lightweight_mode.memory_limit", memory);
        }
        if let Some(cpu) = &light.cpu_limit {
            issues.cpu("lightweight_mode.cpu_limit", cpu);
        }
        if let Some(secs) = light.test_duration_secs {
            issues.positive("lightweight_mode.test_duration_secs", secs);
        }
        if let Some(ms) = light.sample_interval_ms {
            issues.positive("lightweight_mode.sample_interval_ms", ms);
        }
        if let Some(batch) = light.batch_size {
            issues.positive("lightweight_mode.batch_size", batch as u64);
        }

        self.validate_scoring(&mut issues);
        self.validate_environments(&mut issues);

        let compat = ScenarioCompatibility::check(&replay.scenarios);
        for conflict in &compat.conflicts {
            issues.0.push(ConfigIssue::warning(
                "chaos_replay.scenarios",
                format!(
                    "{} and {} conflict (risk {:.2}): {}",
                    conflict.first, conflict.second, conflict.risk, conflict.reason
                ),
            ));
        }

        for issue in &issues.0 {
            tracing::debug!(%issue, "config issue");
        }
        issues.0
    }

    fn validate_scoring(&self, issues: &mut Issues) {
        let s = &self.scoring;
        let weights = [
            ("scoring.success_rate_weight", s.success_rate_weight),
            ("scoring.recovery_weight", s.recovery_weight),
            ("scoring.error_density_weight", s.error_density_weight),
        ];
        for (path, w) in weights {
            if !w.is_finite() || w < 0.0 {
                issues.0.push(ConfigIssue::error(path, format!("weight {w} must be non-negative")));
            }
        }
        let sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            issues.0.push(ConfigIssue::warning(
                "scoring",
                format!("weights sum to {sum:.3}; scores are clamped to [0, 1]"),
            ));
        }
        if s.recovery_reference_secs.is_nan() || s.recovery_reference_secs <= 0.0 {
            issues.0.push(ConfigIssue::error(
                "scoring.recovery_reference_secs",
                "must be greater than zero",
            ));
        }
        issues.rate(
            "scoring.production_intensity_ceiling",
            s.production_intensity_ceiling,
        );
    }

    fn validate_environments(&self, issues: &mut Issues) {
        if !self.environments.contains_key(&self.environment) {
            issues.0.push(ConfigIssue::error(
                "environment",
                format!("environment {:?} is not defined", self.environment),
            ));
        }

        for (name, env) in &self.environments {
            let path = |field: &str| format!("environments.{name}.{field}");

            let m = env.intensity_multiplier;
            if !m.is_finite() || m < 0.0 {
                issues.0.push(ConfigIssue::error(
                    path("intensity_multiplier"),
                    format!("{m} must be non-negative"),
                ));
            } else if m > 1.0 {
                issues.0.push(ConfigIssue::warning(
                    path("intensity_multiplier"),
                    format!("{m} amplifies configured rates beyond their file values"),
                ));
            }
            if !env.timeout_multiplier.is_finite() || env.timeout_multiplier <= 0.0 {
                issues.0.push(ConfigIssue::error(
                    path("timeout_multiplier"),
                    "must be greater than zero",
                ));
            }
            if env.parallel_workers == Some(0) {
                issues.0.push(ConfigIssue::error(path("parallel_workers"), "must be greater than zero"));
            }
            if let Some(memory) = &env.memory_limit {
                issues.memory(&path("memory_limit"), memory);
            }
            if let Some(cpu) = &env.cpu_limit {
                issues.cpu(&path("cpu_limit"), cpu);
            }

            if name == PRODUCTION {
                let ceiling = self.scoring.production_intensity_ceiling;
                if m > ceiling {
                    issues.0.push(ConfigIssue::error(
                        path("intensity_multiplier"),
                        format!("production multiplier {m} exceeds ceiling {ceiling}"),
                    ));
                }
                let missing: Vec<&str> = DANGEROUS_SCENARIOS
                    .iter()
                    .filter(|s| !env.disabled_scenarios.contains(*s))
                    .map(|s| s.as_str())
                    .collect();
                if !missing.is_empty() {
                    issues.0.push(ConfigIssue::error(
                        path("disabled_scenarios"),
                        format!("production must disable {}", missing.join(", ")),
                    ));
                }
            }

            if name == CI {
                if env.timeout_multiplier > CI_MAX_TIMEOUT_MULTIPLIER {
                    issues.0.push(ConfigIssue::error(
                        path("timeout_multiplier"),
                        format!(
                            "ci timeout multiplier {} exceeds {CI_MAX_TIMEOUT_MULTIPLIER}",
                            env.timeout_multiplier
                        ),
                    ));
                }
                if let Some(workers) = env.parallel_workers {
                    if workers > CI_MAX_PARALLEL_WORKERS {
                        issues.0.push(ConfigIssue::error(
                            path("parallel_workers"),
                            format!("ci may use at most {CI_MAX_PARALLEL_WORKERS} workers, got {workers}"),
                        ));
                    }
                }
            }
        }
    }
}
