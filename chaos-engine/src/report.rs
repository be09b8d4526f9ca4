//! Run reports.
//!
//! A [`ChaosReport`] bundles one run's result with the configuration issues
//! and scenario compatibility it ran under. It renders as pretty JSON or as a
//! plain-text summary and is written according to `[reporting]`.

use crate::error::EngineError;
use chaos_config::{
    CompatibilityReport, ConfigIssue, ReportFormat, ReportingConfig, ScenarioCompatibility,
};
use chaos_types::time::unix_millis_now;
use chaos_types::{ChaosTestResult, ScenarioKind};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything known about one run.
#[derive(Debug, Clone, Serialize)]
pub struct ChaosReport {
    /// Creation time (Unix milliseconds).
    pub generated_at_ms: u64,
    /// Run result.
    pub result: ChaosTestResult,
    /// Configuration issues found at load time.
    pub issues: Vec<ConfigIssue>,
    /// Compatibility of the scenarios that ran.
    pub compatibility: CompatibilityReport,
}

impl ChaosReport {
    /// Build a report for a run of `scenarios`.
    pub fn new(
        result: ChaosTestResult,
        issues: Vec<ConfigIssue>,
        scenarios: &[ScenarioKind],
    ) -> Self {
        Self {
            generated_at_ms: unix_millis_now(),
            result,
            issues,
            compatibility: ScenarioCompatibility::check(scenarios),
        }
    }

    /// Pretty JSON. Per-event detail is dropped unless `include_events`.
    pub fn to_json(&self, include_events: bool) -> Result<String, EngineError> {
        if include_events {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        let mut trimmed = self.clone();
        trimmed.result.compact();
        Ok(serde_json::to_string_pretty(&trimmed)?)
    }

    /// Plain-text summary.
    pub fn to_text(&self, include_events: bool) -> String {
        TextReport {
            report: self,
            include_events,
        }
        .to_string()
    }

    /// Write one file per configured format into `output_dir`, creating it
    /// if needed. Returns the paths written.
    pub fn write_to_dir(&self, config: &ReportingConfig) -> Result<Vec<PathBuf>, EngineError> {
        let dir = &config.output_dir;
        std::fs::create_dir_all(dir).map_err(|source| EngineError::ReportWrite {
            path: dir.clone(),
            source,
        })?;

        let stem = format!("{}-{}", file_stem(&self.result.test_name), self.result.run_id);
        let mut written = Vec::with_capacity(config.formats.len());
        for format in &config.formats {
            let (ext, body) = match format {
                ReportFormat::Json => ("json", self.to_json(config.include_events)?),
                ReportFormat::Text => ("txt", self.to_text(config.include_events)),
            };
            let path = dir.join(format!("{stem}.{ext}"));
            write_file(&path, &body)?;
            tracing::info!(path = %path.display(), "report written");
            written.push(path);
        }
        Ok(written)
    }
}

fn write_file(path: &Path, body: &str) -> Result<(), EngineError> {
    std::fs::write(path, body).map_err(|source| EngineError::ReportWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Test names become file names; anything outside `[A-Za-z0-9_-]` is replaced.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "chaos-test".to_string()
    } else {
        stem
    }
}

struct TextReport<'a> {
    report: &'a ChaosReport,
    include_events: bool,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.report.result;
        let m = &r.metrics;
        writeln!(f, "chaos test: {}", r.test_name)?;
        writeln!(f, "run id: {}", r.run_id)?;
        writeln!(f, "duration: {:.2}s", r.total_duration.as_secs_f64())?;
        writeln!(
            f,
            "events: {}  errors: {}  success rate: {:.1}%",
            r.event_count,
            r.error_count,
            r.success_rate * 100.0
        )?;
        writeln!(f, "recovery time: {}ms", r.recovery_time.as_millis())?;
        writeln!(f, "resilience score: {:.3}", r.resilience_score)?;

        writeln!(f)?;
        writeln!(
            f,
            "records: processed {}, mutated {}, failed {}, mean latency {:.2}ms",
            m.records_processed, m.records_mutated, m.record_failures, m.mean_target_latency_ms
        )?;
        if m.mutation_failures > 0 {
            writeln!(f, "mutation failures: {}", m.mutation_failures)?;
        }
        if m.scenarios_cancelled > 0 {
            writeln!(f, "scenarios cut off at deadline: {}", m.scenarios_cancelled)?;
        }
        if !m.per_scenario.is_empty() {
            writeln!(f, "scenarios:")?;
            for (kind, tally) in &m.per_scenario {
                writeln!(
                    f,
                    "  {:<22} executed {:>3}  failed {:>3}",
                    kind.as_str(),
                    tally.executed,
                    tally.failed
                )?;
            }
        }

        let compat = &self.report.compatibility;
        writeln!(f)?;
        writeln!(
            f,
            "compatibility: {} (risk {:.2})",
            if compat.compatible { "compatible" } else { "conflicts" },
            compat.risk_score
        )?;
        for c in &compat.conflicts {
            writeln!(f, "  {} x {} (risk {:.2}): {}", c.first, c.second, c.risk, c.reason)?;
        }
        for rec in &compat.recommendations {
            writeln!(f, "  - {rec}")?;
        }

        if !self.report.issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "config issues:")?;
            for issue in &self.report.issues {
                writeln!(f, "  {issue}")?;
            }
        }

        if self.include_events && !r.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "events:")?;
            for e in &r.events {
                let status = if e.cancelled {
                    "CANCELLED"
                } else if e.success {
                    "ok"
                } else {
                    "FAILED"
                };
                write!(
                    f,
                    "  [{}] {} {} {}ms",
                    e.timestamp_ms,
                    e.scenario,
                    status,
                    e.duration.as_millis()
                )?;
                match &e.error {
                    Some(err) => writeln!(f, ": {err}")?,
                    None => writeln!(f)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_config::ChaosConfig;
    use chaos_types::{ChaosEvent, RunMetrics, ScenarioTally, ScoreWeights};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn sample_report() -> ChaosReport {
        let events = vec![
            ChaosEvent {
                scenario: ScenarioKind::MemoryPressure,
                timestamp_ms: 1,
                duration: Duration::from_millis(12),
                target: "replay-engine".into(),
                parameters: BTreeMap::new(),
                success: true,
                error: None,
                cancelled: false,
            },
            ChaosEvent {
                scenario: ScenarioKind::CompressionBomb,
                timestamp_ms: 2,
                duration: Duration::from_millis(30),
                target: "replay-engine".into(),
                parameters: BTreeMap::new(),
                success: false,
                error: Some("target rejected record: too large".into()),
                cancelled: false,
            },
        ];
        let mut per_scenario = BTreeMap::new();
        per_scenario.insert(
            ScenarioKind::MemoryPressure,
            ScenarioTally { executed: 1, failed: 0 },
        );
        per_scenario.insert(
            ScenarioKind::CompressionBomb,
            ScenarioTally { executed: 1, failed: 1 },
        );
        let metrics = RunMetrics {
            records_processed: 10,
            scenarios_executed: 2,
            scenario_failures: 1,
            per_scenario,
            ..Default::default()
        };
        let result = ChaosTestResult::new(
            "nightly run",
            events,
            Duration::from_secs(2),
            metrics,
            Duration::from_millis(30),
            &ScoreWeights::default(),
        );
        ChaosReport::new(
            result,
            vec![ConfigIssue::warning("chaos_replay.scenarios", "conflicting pair")],
            &[ScenarioKind::MemoryPressure, ScenarioKind::CompressionBomb],
        )
    }

    #[test]
    fn json_respects_include_events() {
        let report = sample_report();
        let full: serde_json::Value =
            serde_json::from_str(&report.to_json(true).unwrap()).unwrap();
        assert_eq!(full["result"]["events"].as_array().unwrap().len(), 2);
        assert_eq!(full["result"]["event_count"], 12);
        assert_eq!(full["compatibility"]["compatible"], false);

        let trimmed: serde_json::Value =
            serde_json::from_str(&report.to_json(false).unwrap()).unwrap();
        assert!(trimmed["result"]["events"].as_array().unwrap().is_empty());
        assert_eq!(trimmed["result"]["error_count"], 1);
    }

    #[test]
    fn text_summary() {
        let text = sample_report().to_text(true);
        assert!(text.contains("chaos test: nightly run"));
        assert!(text.contains("compatibility: conflicts"));
        assert!(text.contains("compression_bomb FAILED 30ms: target rejected record: too large"));
        assert!(text.contains("warning: chaos_replay.scenarios: conflicting pair"));

        assert!(text.contains("\nevents:\n"));

        let short = sample_report().to_text(false);
        assert!(short.contains("events: 12  errors: 1"));
        assert!(!short.contains("\nevents:\n"));
        assert!(!short.contains("compression_bomb FAILED"));
    }

    #[test]
    fn writes_configured_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporting = ChaosConfig::default().reporting;
        reporting.output_dir = dir.path().join("reports");

        let written = sample_report().write_to_dir(&reporting).unwrap();
        assert_eq!(written.len(), 2);
        for path in &written {
            assert!(path.exists());
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("nightly_run-"));
        }

        reporting.formats = vec![ReportFormat::Text];
        assert_eq!(sample_report().write_to_dir(&reporting).unwrap().len(), 1);
    }

    #[test]
    fn file_stems() {
        assert_eq!(file_stem("a/b c"), "a_b_c");
        assert_eq!(file_stem(""), "chaos-test");
    }
}
