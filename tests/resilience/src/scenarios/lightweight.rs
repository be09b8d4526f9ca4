//! Lightweight mode under real resource sampling.

#[cfg(test)]
mod tests {
    use crate::assertions::assert_no_resource_intensive;
    use crate::init_test_logging;
    use chaos_config::ChaosConfig;
    use chaos_engine::{LightweightRunner, MockTarget, ResourceProfile};
    use chaos_types::ScenarioKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn quick_config() -> ChaosConfig {
        let mut config = ChaosConfig::default();
        config.chaos_replay.seed = Some(11);
        config.chaos_replay.fault_duration_ms = 20;
        config.chaos_replay.record_delay_ms = 5;
        config
    }

    fn profile(memory_limit_mb: u64, cpu_cores: f64) -> ResourceProfile {
        ResourceProfile {
            memory_limit_mb,
            cpu_cores,
            test_duration: Duration::from_millis(300),
            ..ResourceProfile::ultra_light()
        }
    }

    /// No process fits in 1MB: every scenario is skipped and reported.
    #[tokio::test]
    async fn l_budget_01_impossible_budget_skips_everything() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        let mut runner =
            LightweightRunner::with_profile(quick_config(), target.clone(), profile(1, 64.0));
        let scenarios = [ScenarioKind::MalformedSpans, ScenarioKind::ClockSkew];

        let report = runner.run("starved", &scenarios, None).await.unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.metrics.tests_skipped, 2);
        assert!(report.metrics.resource_violations >= 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| s.reason.contains("1MB")));
        assert!(report.metrics.peak_memory_mb > 1.0);
        assert!(!report.recommendations.is_empty());
        assert_eq!(target.call_count(), 0);
    }

    /// A generous budget runs the light scenarios and excludes the heavy ones.
    #[tokio::test]
    async fn l_budget_02_generous_budget_runs_light_scenarios() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        let mut runner = LightweightRunner::with_profile(
            quick_config(),
            target.clone(),
            profile(1024 * 1024, 1024.0),
        );
        let scenarios = [
            ScenarioKind::MalformedSpans,
            ScenarioKind::MemoryPressure,
            ScenarioKind::CpuSpike,
            ScenarioKind::ClockSkew,
        ];

        let report = runner.run("light", &scenarios, None).await.unwrap();

        assert_eq!(report.metrics.tests_executed, 2);
        assert_eq!(report.metrics.tests_skipped, 0);
        assert_eq!(
            report.excluded,
            vec![ScenarioKind::MemoryPressure, ScenarioKind::CpuSpike]
        );
        assert_no_resource_intensive(&report).assert_passed();
        assert!(report.results.iter().all(|r| r.error_count == 0));
        assert!(report.metrics.finished_at_ms.is_some());
        assert!((0.0..=1.0).contains(&report.efficiency_score));
    }

    /// The configured section picks the budget.
    #[test]
    fn l_config_01_profile_from_config() {
        let mut config = quick_config();
        config.lightweight_mode.memory_limit = Some("96Mi".into());
        config.lightweight_mode.batch_size = Some(3);
        let runner = LightweightRunner::new(config, Arc::new(MockTarget::new())).unwrap();
        assert_eq!(runner.profile().memory_limit_mb, 96);
        assert_eq!(runner.profile().batch_size, 3);
    }
}
