//! Fault injector history and chaos monkey lifecycle.

#[cfg(test)]
mod tests {
    use crate::init_test_logging;
    use chaos_inject::{ChaosMonkey, ChaosMonkeyConfig, FaultInjector};
    use chaos_types::{FaultKind, FaultParams};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Every non-resource fault completes within its window and is recorded.
    #[tokio::test]
    async fn f_inject_01_every_light_fault_recorded() {
        init_test_logging();
        let injector = FaultInjector::new(31);
        let window = Duration::from_millis(30);
        let light: Vec<FaultKind> = FaultKind::ALL
            .iter()
            .copied()
            .filter(|k| !k.is_resource_intensive())
            .collect();

        for kind in &light {
            let started = Instant::now();
            let result = injector
                .inject_fault(*kind, "replay-engine", FaultParams::new(), window)
                .await;
            assert!(result.success, "{kind}: {:?}", result.error);
            assert_eq!(result.kind, *kind);
            assert!(started.elapsed() < window + Duration::from_millis(200));
        }

        let stats = injector.stats();
        assert_eq!(stats.total, light.len() as u64);
        assert_eq!(stats.failed, 0);
        assert_eq!(injector.history().len(), light.len());
    }

    /// Invalid parameters are reported, not raised.
    #[tokio::test]
    async fn f_inject_02_bad_probability_recorded_as_failure() {
        let injector = FaultInjector::new(32);
        let result = injector
            .inject_fault(
                FaultKind::PacketLoss,
                "replay-engine",
                FaultParams::new().probability(1.5),
                Duration::from_millis(10),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(injector.stats().failed, 1);
    }

    /// The monkey injects while running and stops cleanly.
    #[tokio::test]
    async fn f_monkey_01_start_inject_stop() {
        init_test_logging();
        let injector = Arc::new(FaultInjector::new(33));
        let mut monkey = ChaosMonkey::new(
            Arc::clone(&injector),
            ChaosMonkeyConfig {
                interval: Duration::from_millis(20),
                probability: 1.0,
                kinds: vec![FaultKind::DiskFull, FaultKind::RateLimited],
                fault_duration: Duration::from_millis(5),
                seed: Some(33),
                ..ChaosMonkeyConfig::default()
            },
        );

        monkey.start().unwrap();
        assert!(monkey.is_running());
        assert!(monkey.start().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        let injected = monkey.stop().await;

        assert!(!monkey.is_running());
        assert!(injected > 0);
        assert_eq!(injector.stats().total, injected);
        assert!(injector
            .history()
            .iter()
            .all(|r| matches!(r.kind, FaultKind::DiskFull | FaultKind::RateLimited)));
    }

    /// A monkey with nothing to target refuses to start.
    #[tokio::test]
    async fn f_monkey_02_no_targets_rejected() {
        let mut monkey = ChaosMonkey::new(
            Arc::new(FaultInjector::new(34)),
            ChaosMonkeyConfig {
                targets: Vec::new(),
                ..ChaosMonkeyConfig::default()
            },
        );
        assert!(monkey.start().is_err());
        assert_eq!(monkey.stop().await, 0);
    }
}
