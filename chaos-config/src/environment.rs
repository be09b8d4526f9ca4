//! Deployment environments and their built-in presets.

use chaos_types::ScenarioKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scenarios production must disable.
pub const DANGEROUS_SCENARIOS: &[ScenarioKind] = &[
    ScenarioKind::MemoryPressure,
    ScenarioKind::CpuSpike,
    ScenarioKind::DiskFull,
    ScenarioKind::FdExhaustion,
    ScenarioKind::NetworkPartition,
    ScenarioKind::CompressionBomb,
];

/// Name of the production environment.
pub const PRODUCTION: &str = "production";

/// Name of the CI environment.
pub const CI: &str = "ci";

/// Highest timeout multiplier CI may use.
pub const CI_MAX_TIMEOUT_MULTIPLIER: f64 = 2.0;

/// Most parallel workers CI may use.
pub const CI_MAX_PARALLEL_WORKERS: usize = 2;

/// Overrides applied when an environment is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Factor applied to every rate and intensity (default: 1.0).
    #[serde(default = "default_multiplier")]
    pub intensity_multiplier: f64,
    /// Replaces the lightweight memory budget.
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// Replaces the lightweight CPU budget.
    #[serde(default)]
    pub cpu_limit: Option<String>,
    /// Scenarios removed from every run.
    #[serde(default)]
    pub disabled_scenarios: Vec<ScenarioKind>,
    /// Factor applied to target timeouts (default: 1.0).
    #[serde(default = "default_multiplier")]
    pub timeout_multiplier: f64,
    /// Replaces the replay worker count.
    #[serde(default)]
    pub parallel_workers: Option<usize>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            intensity_multiplier: default_multiplier(),
            memory_limit: None,
            cpu_limit: None,
            disabled_scenarios: Vec::new(),
            timeout_multiplier: default_multiplier(),
            parallel_workers: None,
        }
    }
}

/// `development`, `ci`, `staging` and `production` presets.
pub fn builtin_environments() -> BTreeMap<String, EnvironmentConfig> {
    let mut envs = BTreeMap::new();
    envs.insert("development".to_string(), EnvironmentConfig::default());
    envs.insert(
        CI.to_string(),
        EnvironmentConfig {
            intensity_multiplier: 0.5,
            memory_limit: Some("256MB".to_string()),
            disabled_scenarios: ScenarioKind::RESOURCE_INTENSIVE.to_vec(),
            timeout_multiplier: 1.5,
            parallel_workers: Some(CI_MAX_PARALLEL_WORKERS),
            ..EnvironmentConfig::default()
        },
    );
    envs.insert(
        "staging".to_string(),
        EnvironmentConfig {
            intensity_multiplier: 0.7,
            ..EnvironmentConfig::default()
        },
    );
    envs.insert(
        PRODUCTION.to_string(),
        EnvironmentConfig {
            intensity_multiplier: 0.3,
            memory_limit: Some("64MB".to_string()),
            cpu_limit: Some("250m".to_string()),
            disabled_scenarios: DANGEROUS_SCENARIOS.to_vec(),
            parallel_workers: Some(1),
            ..EnvironmentConfig::default()
        },
    );
    envs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_present() {
        let envs = builtin_environments();
        let names: Vec<_> = envs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ci", "development", "production", "staging"]);
    }

    #[test]
    fn production_preset_is_conservative() {
        let envs = builtin_environments();
        let prod = &envs[PRODUCTION];
        assert!(prod.intensity_multiplier <= 0.5);
        for s in DANGEROUS_SCENARIOS {
            assert!(prod.disabled_scenarios.contains(s));
        }
    }

    #[test]
    fn partial_environment_uses_defaults() {
        let env: EnvironmentConfig = toml::from_str("intensity_multiplier = 0.2").unwrap();
        assert_eq!(env.timeout_multiplier, 1.0);
        assert!(env.disabled_scenarios.is_empty());
    }
}
