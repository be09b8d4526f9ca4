//! Configuration loading with environment-variable overrides.
//!
//! Load order: file (or defaults), then `CHAOS_<SECTION>_<FIELD>` overrides,
//! then built-in environments, then the active environment. Nothing in this
//! path returns an error; problems are collected as [`ConfigIssue`]s and the
//! best configuration available is returned.

use crate::config::ChaosConfig;
use crate::error::ConfigError;
use crate::validate::ConfigIssue;
use std::path::{Path, PathBuf};

/// Prefix of every override variable.
pub const ENV_PREFIX: &str = "CHAOS_";

/// Variable selecting the active environment.
pub const ENVIRONMENT_VAR: &str = "CHAOS_ENVIRONMENT";

/// Sections that accept overrides, in upper-case variable form.
const SECTIONS: &[(&str, &str)] = &[
    ("GORK_GENERATION", "gork_generation"),
    ("LIGHTWEIGHT_MODE", "lightweight_mode"),
    ("SPAN_MUTATION", "span_mutation"),
    ("CHAOS_REPLAY", "chaos_replay"),
    ("REPORTING", "reporting"),
    ("MUTATION", "mutation"),
    ("SCORING", "scoring"),
];

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file.
    File(PathBuf),
    /// Built-in defaults; the file, if any, could not be used.
    Defaults {
        /// File that was attempted.
        attempted: Option<PathBuf>,
    },
}

/// A configuration plus everything noticed while loading it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Final configuration, environment applied.
    pub config: ChaosConfig,
    /// Load and validation issues.
    pub issues: Vec<ConfigIssue>,
    /// Origin of the configuration.
    pub source: ConfigSource,
    path: Option<PathBuf>,
}

impl LoadedConfig {
    /// True when any error-level issue was found.
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ConfigIssue::is_error)
    }

    /// Repeat the load against the same path and the current process
    /// environment.
    pub fn reload(&self) -> LoadedConfig {
        ConfigLoader::load_with_env(self.path.as_deref(), std::env::vars())
    }
}

/// Loads [`ChaosConfig`] from files and the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `path` (defaults when `None`) with process environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> LoadedConfig {
        Self::load_with_env(path, std::env::vars())
    }

    /// Load from `path` with overrides taken from `vars`.
    pub fn load_with_env<I, K, V>(path: Option<&Path>, vars: I) -> LoadedConfig
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut issues = Vec::new();

        let (mut config, source) = match path {
            Some(path) => match ChaosConfig::from_file(path) {
                Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to default configuration");
                    issues.push(ConfigIssue::error("config", e.to_string()));
                    (
                        ChaosConfig::default(),
                        ConfigSource::Defaults {
                            attempted: Some(path.to_path_buf()),
                        },
                    )
                }
            },
            None => (ChaosConfig::default(), ConfigSource::Defaults { attempted: None }),
        };

        let mut overrides: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(k, _)| k.as_ref().starts_with(ENV_PREFIX))
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        // Deterministic order regardless of how the environment iterates.
        overrides.sort();

        for (var, value) in &overrides {
            match apply_override(&config, var, value) {
                Ok(Some(updated)) => {
                    tracing::debug!(var = %var, "config override applied");
                    config = updated;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "config override ignored");
                    issues.push(ConfigIssue::error(var.clone(), e.to_string()));
                }
            }
        }

        config.merge_builtin_environments();
        if !config.apply_environment() {
            issues.push(ConfigIssue::error(
                "environment",
                format!("environment {:?} is not defined; no environment applied", config.environment),
            ));
        }

        for issue in config.validate() {
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }

        tracing::info!(
            environment = %config.environment,
            issues = issues.len(),
            "configuration loaded"
        );

        LoadedConfig {
            config,
            issues,
            source,
            path: path.map(Path::to_path_buf),
        }
    }
}

/// Apply one override. `Ok(None)` means the variable is not a config
/// override at all.
fn apply_override(
    config: &ChaosConfig,
    var: &str,
    raw: &str,
) -> Result<Option<ChaosConfig>, ConfigError> {
    let rejected = |message: String| ConfigError::Override {
        var: var.to_string(),
        message,
    };

    if var == ENVIRONMENT_VAR {
        let mut updated = config.clone();
        updated.environment = raw.to_string();
        return Ok(Some(updated));
    }

    let Some(rest) = var.strip_prefix(ENV_PREFIX) else {
        return Ok(None);
    };
    let Some((section, field)) = SECTIONS.iter().find_map(|(upper, section)| {
        rest.strip_prefix(upper)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|f| !f.is_empty())
            .map(|f| (*section, f.to_ascii_lowercase()))
    }) else {
        return Err(rejected("no such configuration section".to_string()));
    };

    let mut document = toml::Value::try_from(config).map_err(|e| rejected(e.to_string()))?;
    let table = document
        .as_table_mut()
        .and_then(|root| {
            root.entry(section)
                .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                .as_table_mut()
        })
        .ok_or_else(|| rejected(format!("section {section} is not a table")))?;
    table.insert(field, parse_override_value(raw));

    let updated: ChaosConfig = document.try_into().map_err(|e: toml::de::Error| rejected(e.message().to_string()))?;
    Ok(Some(updated))
}

/// Read an override as a TOML literal, falling back to a plain string.
fn parse_override_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_types::ScenarioKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_file() {
        let file = write_config("[chaos_replay]\nconcurrency = 3\n");
        let loaded = ConfigLoader::load_with_env(Some(file.path()), no_env());
        assert_eq!(loaded.source, ConfigSource::File(file.path().to_path_buf()));
        assert_eq!(loaded.config.chaos_replay.concurrency, 3);
        assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = ConfigLoader::load_with_env(Some(Path::new("/nonexistent/chaos.toml")), no_env());
        assert!(matches!(loaded.source, ConfigSource::Defaults { attempted: Some(_) }));
        assert!(loaded.has_errors());
        assert_eq!(loaded.config.chaos_replay.concurrency, 4);
    }

    #[test]
    fn parse_failure_falls_back_to_defaults() {
        let file = write_config("[mutation\nmutation_rate = ");
        let loaded = ConfigLoader::load_with_env(Some(file.path()), no_env());
        assert!(matches!(loaded.source, ConfigSource::Defaults { .. }));
        assert!(loaded.issues.iter().any(|i| i.path == "config"));
    }

    #[test]
    fn overrides_win_over_file() {
        let file = write_config("[mutation]\nmutation_rate = 0.2\n");
        let loaded = ConfigLoader::load_with_env(
            Some(file.path()),
            vec![
                ("CHAOS_MUTATION_MUTATION_RATE", "0.4"),
                ("CHAOS_CHAOS_REPLAY_CONCURRENCY", "7"),
                ("CHAOS_SPAN_MUTATION_TRACE_SPAN_COUNT", "9"),
                ("CHAOS_REPORTING_OUTPUT_DIR", "/tmp/reports"),
                ("CHAOS_CHAOS_REPLAY_SCENARIOS", "[\"slow_network\"]"),
                ("PATH", "/usr/bin"),
            ],
        );
        // development multiplier is 1.0
        assert_eq!(loaded.config.mutation.mutation_rate, 0.4);
        assert_eq!(loaded.config.chaos_replay.concurrency, 7);
        assert_eq!(loaded.config.span_mutation.trace_span_count, 9);
        assert_eq!(loaded.config.reporting.output_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(loaded.config.chaos_replay.scenarios, vec![ScenarioKind::SlowNetwork]);
        assert!(loaded.issues.is_empty(), "{:?}", loaded.issues);
    }

    #[test]
    fn bad_override_is_reported_and_ignored() {
        let loaded = ConfigLoader::load_with_env(
            None,
            vec![
                ("CHAOS_CHAOS_REPLAY_CONCURRENCY", "many"),
                ("CHAOS_MUTATION_NOT_A_FIELD", "1"),
                ("CHAOS_NOWHERE_FIELD", "1"),
            ],
        );
        assert_eq!(loaded.config.chaos_replay.concurrency, 4);
        let paths: Vec<&str> = loaded.issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"CHAOS_CHAOS_REPLAY_CONCURRENCY"));
        assert!(paths.contains(&"CHAOS_MUTATION_NOT_A_FIELD"));
        assert!(paths.contains(&"CHAOS_NOWHERE_FIELD"));
    }

    #[test]
    fn environment_variable_selects_environment() {
        let loaded = ConfigLoader::load_with_env(None, vec![("CHAOS_ENVIRONMENT", "production")]);
        assert_eq!(loaded.config.environment, "production");
        assert!(loaded.config.environment_applied());
        assert!((loaded.config.chaos_replay.chaos_intensity - 0.09).abs() < 1e-9);
        assert!(!loaded.has_errors(), "{:?}", loaded.issues);
    }

    #[test]
    fn unknown_environment_is_an_issue() {
        let loaded = ConfigLoader::load_with_env(None, vec![("CHAOS_ENVIRONMENT", "mars")]);
        assert!(loaded.issues.iter().any(|i| i.path == "environment"));
    }

    #[test]
    fn reload_reads_file_again() {
        let file = write_config("[chaos_replay]\nconcurrency = 3\n");
        let loaded = ConfigLoader::load_with_env(Some(file.path()), no_env());
        assert_eq!(loaded.config.chaos_replay.concurrency, 3);

        std::fs::write(file.path(), "[chaos_replay]\nconcurrency = 5\n").unwrap();
        let reloaded = loaded.reload();
        assert_eq!(reloaded.config.chaos_replay.concurrency, 5);
    }

    #[test]
    fn override_values_parse_as_toml() {
        assert_eq!(parse_override_value("3"), toml::Value::Integer(3));
        assert_eq!(parse_override_value("true"), toml::Value::Boolean(true));
        assert_eq!(
            parse_override_value("chaos-out"),
            toml::Value::String("chaos-out".into())
        );
    }
}
