//! Configuration safety: production ceiling, CI limits, scenario conflicts.

#[cfg(test)]
mod tests {
    use crate::init_test_logging;
    use chaos_config::{ChaosConfig, ConfigLoader, ConfigSource, ScenarioCompatibility};
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    // ====================================================================
    // Scenario compatibility
    // ====================================================================

    /// Memory pressure next to a compression bomb is flagged.
    #[test]
    fn c_compat_01_memory_pressure_and_bomb_conflict() {
        let report =
            ScenarioCompatibility::check_names(&["memory_pressure", "compression_bomb"]).unwrap();
        assert!(!report.compatible);
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.risk_score > 0.5);
        assert!(!report.recommendations.is_empty());
    }

    /// Unrelated scenarios are compatible.
    #[test]
    fn c_compat_02_slow_network_and_cpu_spike_compatible() {
        let report = ScenarioCompatibility::check_names(&["slow_network", "cpu_spike"]).unwrap();
        assert!(report.compatible);
        assert!(report.conflicts.is_empty());
    }

    /// Unknown scenario names are rejected.
    #[test]
    fn c_compat_03_unknown_name_rejected() {
        assert!(ScenarioCompatibility::check_names(&["meteor_strike"]).is_err());
    }

    // ====================================================================
    // Environment safety
    // ====================================================================

    /// The production multiplier may not exceed the ceiling.
    #[test]
    fn c_env_01_production_ceiling() {
        init_test_logging();
        assert!(ChaosConfig::default().validate().is_empty());

        let mut config = ChaosConfig::default();
        config
            .environments
            .get_mut("production")
            .unwrap()
            .intensity_multiplier = 0.8;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.is_error() && i.path == "environments.production.intensity_multiplier"));

        config
            .environments
            .get_mut("production")
            .unwrap()
            .intensity_multiplier = 0.3;
        assert!(config.validate().is_empty());
    }

    /// Production must keep the dangerous scenarios disabled.
    #[test]
    fn c_env_02_production_keeps_dangerous_scenarios_disabled() {
        let mut config = ChaosConfig::default();
        config
            .environments
            .get_mut("production")
            .unwrap()
            .disabled_scenarios
            .clear();
        assert!(config
            .validate()
            .iter()
            .any(|i| i.path == "environments.production.disabled_scenarios"));
    }

    /// CI worker and timeout limits are enforced.
    #[test]
    fn c_env_03_ci_limits() {
        let mut config = ChaosConfig::default();
        let ci = config.environments.get_mut("ci").unwrap();
        ci.parallel_workers = Some(8);
        ci.timeout_multiplier = 3.0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.path == "environments.ci.parallel_workers"));
        assert!(issues.iter().any(|i| i.path == "environments.ci.timeout_multiplier"));
    }

    // ====================================================================
    // Loading
    // ====================================================================

    /// An unreadable file falls back to defaults with an error issue.
    #[test]
    fn c_load_01_bad_file_falls_back_to_defaults() {
        init_test_logging();
        let file = write_config("[chaos_replay]\nconcurrency = \"lots\"\n");
        let loaded = ConfigLoader::load_with_env(Some(file.path()), Vec::<(String, String)>::new());

        assert!(loaded.has_errors());
        assert!(matches!(loaded.source, ConfigSource::Defaults { attempted: Some(_) }));
        assert_eq!(
            loaded.config.chaos_replay.concurrency,
            ChaosConfig::default().chaos_replay.concurrency
        );
    }

    /// A file-defined production environment is still held to the ceiling.
    #[test]
    fn c_load_02_file_production_multiplier_checked() {
        let file = write_config(
            "[environments.production]\n\
             intensity_multiplier = 0.8\n\
             disabled_scenarios = [\"memory_pressure\", \"cpu_spike\", \"disk_full\", \"fd_exhaustion\", \"network_partition\", \"compression_bomb\"]\n",
        );
        let loaded = ConfigLoader::load_with_env(Some(file.path()), Vec::<(String, String)>::new());
        assert!(matches!(loaded.source, ConfigSource::File(_)));
        assert!(loaded
            .issues
            .iter()
            .any(|i| i.path == "environments.production.intensity_multiplier"));
    }

    /// Selecting CI scales intensities, drops heavy scenarios and caps workers.
    #[test]
    fn c_load_03_ci_environment_applied() {
        let loaded = ConfigLoader::load_with_env(None, [("CHAOS_ENVIRONMENT", "ci")]);
        let config = &loaded.config;
        assert!(config.environment_applied());
        assert_eq!(config.chaos_replay.concurrency, 2);
        assert!((config.chaos_replay.chaos_intensity - 0.15).abs() < 1e-9);
        assert!(config
            .chaos_replay
            .scenarios
            .iter()
            .all(|s| !s.is_resource_intensive()));
    }

    /// Overrides reach nested settings; bad ones become issues.
    #[test]
    fn c_load_04_env_overrides() {
        let loaded = ConfigLoader::load_with_env(
            None,
            [
                ("CHAOS_CHAOS_REPLAY_RECORD_DELAY_MS", "25"),
                ("CHAOS_NOPE_FIELD", "1"),
            ],
        );
        assert_eq!(loaded.config.chaos_replay.record_delay_ms, 25);
        assert!(loaded.issues.iter().any(|i| i.path == "CHAOS_NOPE_FIELD"));
    }
}
