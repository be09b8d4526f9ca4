//! End-to-end engine runs.
//!
//! Each test drives [`ChaosReplayEngine`](chaos_engine::ChaosReplayEngine)
//! against an in-process target and checks the scored result.

#[cfg(test)]
mod tests {
    use crate::assertions::{
        assert_respects_deadline, assert_result_consistent, assert_scenarios_recorded,
    };
    use crate::init_test_logging;
    use crate::targets::{RecoveringTarget, ValidatingTarget};
    use chaos_config::ChaosConfig;
    use chaos_engine::{ChaosReplayEngine, ChaosReport, MockTarget};
    use chaos_inject::FaultInjector;
    use chaos_types::{FaultKind, ScenarioKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn seeded_config(seed: u64) -> ChaosConfig {
        let mut config = ChaosConfig::default();
        config.chaos_replay.seed = Some(seed);
        config
    }

    // ====================================================================
    // Healthy and failing targets
    // ====================================================================

    /// A target that accepts everything scores near perfect.
    #[tokio::test]
    async fn e_run_01_healthy_target_scores_high() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        let engine = ChaosReplayEngine::new(seeded_config(1), target.clone());
        let scenarios = [ScenarioKind::MalformedSpans];

        let result = engine
            .run_chaos_test("t1", &scenarios, Duration::from_secs(2), None, 1)
            .await
            .unwrap();

        assert_eq!(result.error_count, 0);
        assert_eq!(result.success_rate, 1.0);
        assert!(result.resilience_score >= 0.9, "score {}", result.resilience_score);
        assert!(target.call_count() > 0);
        assert_result_consistent(&result).assert_passed();
        assert_scenarios_recorded(&result, &scenarios).assert_passed();
    }

    /// A target that rejects everything scores lower than a healthy one.
    #[tokio::test]
    async fn e_run_02_failing_target_scores_lower() {
        init_test_logging();
        let scenarios = [ScenarioKind::MalformedSpans];
        let duration = Duration::from_secs(1);

        let healthy = ChaosReplayEngine::new(seeded_config(2), Arc::new(MockTarget::new()))
            .run_chaos_test("healthy", &scenarios, duration, None, 1)
            .await
            .unwrap();
        let failing =
            ChaosReplayEngine::new(seeded_config(2), Arc::new(MockTarget::failing("down")))
                .run_chaos_test("failing", &scenarios, duration, None, 1)
                .await
                .unwrap();

        assert!(failing.error_count > 0);
        assert!(failing.success_rate < 1.0);
        assert!(failing.resilience_score < healthy.resilience_score);
        assert_result_consistent(&failing).assert_passed();
        let event = failing.events_for(ScenarioKind::MalformedSpans).next().unwrap();
        assert!(!event.success);
        assert!(event.error.as_deref().unwrap_or_default().contains("down"));
    }

    /// Target calls are bounded by workers times deadline over record delay.
    #[tokio::test]
    async fn e_run_03_call_count_bounded_by_delay() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        let config = seeded_config(3);
        let delay_ms = config.chaos_replay.record_delay_ms;
        let engine = ChaosReplayEngine::new(config, target.clone());
        let duration = Duration::from_millis(500);
        let workers = 2u64;

        let result = engine
            .run_chaos_test("bounded", &[], duration, None, workers as usize)
            .await
            .unwrap();

        let per_worker = duration.as_millis() as u64 / delay_ms + 2;
        assert!(target.call_count() > 0);
        assert!(
            target.call_count() <= workers * per_worker,
            "{} calls for {workers} workers",
            target.call_count()
        );
        assert_eq!(result.metrics.records_processed, target.call_count());
        assert_respects_deadline(&result, duration, Duration::from_secs(1)).assert_passed();
    }

    // ====================================================================
    // Realistic targets
    // ====================================================================

    /// A validating consumer rejects the malformed input the run produces.
    #[tokio::test]
    async fn e_target_01_validating_target_rejects_malformed_spans() {
        init_test_logging();
        let target = Arc::new(ValidatingTarget::new());
        let engine = ChaosReplayEngine::new(seeded_config(4), target.clone());
        let scenarios = [ScenarioKind::MalformedSpans, ScenarioKind::CorruptedTraces];

        let result = engine
            .run_chaos_test("validating", &scenarios, Duration::from_secs(1), None, 2)
            .await
            .unwrap();

        assert!(target.rejected() > 0);
        assert!(target.accepted() > 0);
        assert!(result.error_count > 0);
        assert!(result.resilience_score < 1.0);
        assert_result_consistent(&result).assert_passed();
        assert_scenarios_recorded(&result, &scenarios).assert_passed();
    }

    /// Failures during an outage are counted and timed; the run recovers.
    #[tokio::test]
    async fn e_target_02_recovering_target() {
        init_test_logging();
        let target = Arc::new(RecoveringTarget::new(5, Duration::from_millis(20)));
        let engine = ChaosReplayEngine::new(seeded_config(5), target.clone());

        let result = engine
            .run_chaos_test("outage", &[], Duration::from_secs(1), None, 1)
            .await
            .unwrap();

        assert!(target.calls() > 5);
        assert_eq!(result.error_count, 5);
        assert!(result.recovery_time >= Duration::from_millis(20));
        assert!(result.success_rate > 0.5);
        assert_result_consistent(&result).assert_passed();
    }

    // ====================================================================
    // Faults, deadlines and reports
    // ====================================================================

    /// Fault scenarios go through the shared injector.
    #[tokio::test]
    async fn e_fault_01_fault_scenarios_use_injector() {
        init_test_logging();
        let injector = Arc::new(FaultInjector::new(6));
        let engine = ChaosReplayEngine::new(seeded_config(6), Arc::new(MockTarget::new()))
            .with_injector(Arc::clone(&injector));
        let scenarios = [ScenarioKind::SlowNetwork, ScenarioKind::DiskFull];

        let result = engine
            .run_chaos_test("faults", &scenarios, Duration::from_secs(2), None, 1)
            .await
            .unwrap();

        let stats = injector.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.per_kind.get(&FaultKind::NetworkDelay), Some(&1));
        assert_eq!(stats.per_kind.get(&FaultKind::DiskFull), Some(&1));
        assert_scenarios_recorded(&result, &scenarios).assert_passed();
    }

    /// A slow target cannot hold the run past its deadline.
    #[tokio::test]
    async fn e_deadline_01_slow_target_respects_deadline() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        target.set_latency(Duration::from_millis(300));
        let engine = ChaosReplayEngine::new(seeded_config(7), target);
        let duration = Duration::from_millis(800);
        let scenarios = [ScenarioKind::GorkPayloads, ScenarioKind::RaceCondition];

        let result = engine
            .run_chaos_test("slow", &scenarios, duration, None, 2)
            .await
            .unwrap();

        assert_respects_deadline(&result, duration, Duration::from_secs(1)).assert_passed();
        assert_scenarios_recorded(&result, &scenarios).assert_passed();
        assert_result_consistent(&result).assert_passed();
    }

    /// A fault window longer than the run is cut off without counting as a target error.
    #[tokio::test]
    async fn e_deadline_02_cut_off_fault_keeps_healthy_score() {
        init_test_logging();
        let target = Arc::new(MockTarget::new());
        let engine = ChaosReplayEngine::new(seeded_config(9), target.clone());
        let duration = Duration::from_millis(400);
        let scenarios = [ScenarioKind::NetworkPartition];

        let result = engine
            .run_chaos_test("short partition", &scenarios, duration, None, 1)
            .await
            .unwrap();

        assert_scenarios_recorded(&result, &scenarios).assert_passed();
        assert_result_consistent(&result).assert_passed();
        assert_eq!(target.failure_count(), 0);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.metrics.scenarios_cancelled, 1);
        assert!(result.events[0].cancelled);
    }

    /// A finished run writes JSON and text reports.
    #[tokio::test]
    async fn e_report_01_run_report_written() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut config = seeded_config(8);
        config.reporting.output_dir = dir.path().to_path_buf();
        let reporting = config.reporting.clone();
        let issues = config.validate();
        let engine = ChaosReplayEngine::new(config, Arc::new(MockTarget::new()));
        let scenarios = [ScenarioKind::MutatedRecords, ScenarioKind::UnicodeHazards];

        let result = engine
            .run_chaos_test("report run", &scenarios, Duration::from_millis(500), None, 1)
            .await
            .unwrap();
        let event_count = result.event_count;
        let written = ChaosReport::new(result, issues, &scenarios)
            .write_to_dir(&reporting)
            .unwrap();

        assert_eq!(written.len(), 2);
        let json = written
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == "json"))
            .unwrap();
        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(body["result"]["test_name"], "report run");
        assert_eq!(body["result"]["event_count"], event_count);
        assert_eq!(body["compatibility"]["compatible"], true);
    }
}
