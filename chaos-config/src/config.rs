//! Configuration types for replay-chaos.
//!
//! Configuration is loaded from a TOML file (default: `chaos.toml`). Every
//! field has a default, so an empty file is a valid configuration.

use crate::environment::{builtin_environments, EnvironmentConfig};
use crate::error::ConfigError;
use chaos_types::{GorkCategory, MutationKind, ScenarioKind, ScoreWeights, SpanMalformationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for replay-chaos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChaosConfig {
    /// Active environment name.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Mutation engine settings.
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Replay engine settings.
    #[serde(default)]
    pub chaos_replay: ChaosReplayConfig,
    /// Span mutator settings.
    #[serde(default)]
    pub span_mutation: SpanMutationConfig,
    /// Gork generator settings.
    #[serde(default)]
    pub gork_generation: GorkGenerationConfig,
    /// Report output settings.
    #[serde(default)]
    pub reporting: ReportingConfig,
    /// Lightweight mode settings.
    #[serde(default)]
    pub lightweight_mode: LightweightModeConfig,
    /// Resilience score weights and thresholds.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Per-environment overrides, keyed by environment name.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(skip)]
    environment_applied: bool,
}

/// Mutation engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutationConfig {
    /// Probability a record is mutated (default: 0.1).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Kinds to pick from; empty means all.
    #[serde(default)]
    pub enabled_kinds: Vec<MutationKind>,
    /// Field names preferred by targeted mutation.
    #[serde(default = "default_targeted_fields")]
    pub targeted_fields: Vec<String>,
    /// Deepest nesting the engine will recurse into (default: 16).
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Size of overflow injections in bytes (default: 256KB).
    #[serde(default = "default_overflow_bytes")]
    pub overflow_bytes: usize,
}

/// Chaos replay engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChaosReplayConfig {
    /// Probability a replayed record is mutated first (default: 0.3).
    #[serde(default = "default_chaos_intensity")]
    pub chaos_intensity: f64,
    /// Replay workers (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Run length in seconds (default: 60).
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Pause between records within one worker (default: 10ms).
    #[serde(default = "default_record_delay_ms")]
    pub record_delay_ms: u64,
    /// Per-call target timeout (default: 5000ms).
    #[serde(default = "default_target_timeout_ms")]
    pub target_timeout_ms: u64,
    /// Window for each injected fault (default: 500ms).
    #[serde(default = "default_fault_duration_ms")]
    pub fault_duration_ms: u64,
    /// Scenarios scheduled per run.
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<ScenarioKind>,
    /// Base seed for reproducible runs. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Span mutator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpanMutationConfig {
    /// Fraction of malformation kinds applied per span (default: 0.5).
    #[serde(default = "default_malformation_intensity")]
    pub malformation_intensity: f64,
    /// Kinds to pick from; empty means all.
    #[serde(default)]
    pub enabled_kinds: Vec<SpanMalformationKind>,
    /// Child spans per malformed trace (default: 5).
    #[serde(default = "default_trace_span_count")]
    pub trace_span_count: usize,
    /// Oversized attribute payload in bytes (default: 256KB).
    #[serde(default = "default_oversized_attribute_bytes")]
    pub oversized_attribute_bytes: usize,
}

/// Gork generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GorkGenerationConfig {
    /// Corruption density (default: 0.1).
    #[serde(default = "default_corruption_rate")]
    pub corruption_rate: f64,
    /// Categories to generate; empty means all.
    #[serde(default)]
    pub enabled_categories: Vec<GorkCategory>,
    /// Expanded size of compression bombs (default: 8MB).
    #[serde(default = "default_bomb_size_mb")]
    pub bomb_size_mb: usize,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Pretty-printed JSON.
    Json,
    /// Plain-text summary.
    Text,
}

/// Report output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingConfig {
    /// Directory reports are written to (default: `chaos-reports`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Formats written per run (default: json and text).
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
    /// Include every scenario event in reports (default: true).
    #[serde(default = "default_include_events")]
    pub include_events: bool,
}

/// Named lightweight resource profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileName {
    /// Smallest footprint.
    UltraLight,
    /// Default footprint.
    Standard,
    /// Most headroom.
    Balanced,
    /// Tuned for CI runners.
    Ci,
    /// Tuned for local development.
    Development,
}

/// Lightweight mode configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightweightModeConfig {
    /// Use lightweight mode instead of the full engine (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Preset to start from; picked from system resources when unset.
    #[serde(default)]
    pub profile: Option<ProfileName>,
    /// Memory budget, e.g. `128MB`. Unset keeps the preset's.
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// CPU budget in cores or millicores. Unset keeps the preset's.
    #[serde(default)]
    pub cpu_limit: Option<String>,
    /// Per-scenario duration in seconds. Unset keeps the preset's.
    #[serde(default)]
    pub test_duration_secs: Option<u64>,
    /// Resource sampling interval in milliseconds. Unset keeps the preset's.
    #[serde(default)]
    pub sample_interval_ms: Option<u64>,
    /// Records per replay batch. Unset keeps the preset's.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Score weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Weight of the success rate (default: 0.5).
    #[serde(default = "default_success_weight")]
    pub success_rate_weight: f64,
    /// Weight of normalized recovery time (default: 0.3).
    #[serde(default = "default_recovery_weight")]
    pub recovery_weight: f64,
    /// Weight of error density (default: 0.2).
    #[serde(default = "default_error_weight")]
    pub error_density_weight: f64,
    /// Recovery time that scores zero, in seconds (default: 10).
    #[serde(default = "default_recovery_reference_secs")]
    pub recovery_reference_secs: f64,
    /// Highest intensity multiplier allowed in production (default: 0.5).
    #[serde(default = "default_production_ceiling")]
    pub production_intensity_ceiling: f64,
}

// Default value functions
fn default_environment() -> String {
    "development".to_string()
}

fn default_mutation_rate() -> f64 {
    0.1
}

fn default_targeted_fields() -> Vec<String> {
    ["prompt", "token", "api_key", "message", "user_id"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_depth() -> usize {
    16
}

fn default_overflow_bytes() -> usize {
    256 * 1024 // 256KB
}

fn default_chaos_intensity() -> f64 {
    0.3
}

fn default_concurrency() -> usize {
    4
}

fn default_duration_secs() -> u64 {
    60
}

fn default_record_delay_ms() -> u64 {
    10
}

fn default_target_timeout_ms() -> u64 {
    5000
}

fn default_fault_duration_ms() -> u64 {
    500
}

fn default_scenarios() -> Vec<ScenarioKind> {
    vec![
        ScenarioKind::MalformedSpans,
        ScenarioKind::CorruptedTraces,
        ScenarioKind::GorkPayloads,
        ScenarioKind::MutatedRecords,
        ScenarioKind::SlowNetwork,
        ScenarioKind::ServiceUnavailable,
    ]
}

fn default_malformation_intensity() -> f64 {
    0.5
}

fn default_trace_span_count() -> usize {
    5
}

fn default_oversized_attribute_bytes() -> usize {
    256 * 1024 // 256KB
}

fn default_corruption_rate() -> f64 {
    0.1
}

fn default_bomb_size_mb() -> usize {
    8
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("chaos-reports")
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Json, ReportFormat::Text]
}

fn default_include_events() -> bool {
    true
}

fn default_success_weight() -> f64 {
    0.5
}

fn default_recovery_weight() -> f64 {
    0.3
}

fn default_error_weight() -> f64 {
    0.2
}

fn default_recovery_reference_secs() -> f64 {
    10.0
}

fn default_production_ceiling() -> f64 {
    0.5
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_mutation_rate(),
            enabled_kinds: Vec::new(),
            targeted_fields: default_targeted_fields(),
            max_depth: default_max_depth(),
            overflow_bytes: default_overflow_bytes(),
        }
    }
}

impl Default for ChaosReplayConfig {
    fn default() -> Self {
        Self {
            chaos_intensity: default_chaos_intensity(),
            concurrency: default_concurrency(),
            duration_secs: default_duration_secs(),
            record_delay_ms: default_record_delay_ms(),
            target_timeout_ms: default_target_timeout_ms(),
            fault_duration_ms: default_fault_duration_ms(),
            scenarios: default_scenarios(),
            seed: None,
        }
    }
}

impl Default for SpanMutationConfig {
    fn default() -> Self {
        Self {
            malformation_intensity: default_malformation_intensity(),
            enabled_kinds: Vec::new(),
            trace_span_count: default_trace_span_count(),
            oversized_attribute_bytes: default_oversized_attribute_bytes(),
        }
    }
}

impl Default for GorkGenerationConfig {
    fn default() -> Self {
        Self {
            corruption_rate: default_corruption_rate(),
            enabled_categories: Vec::new(),
            bomb_size_mb: default_bomb_size_mb(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            formats: default_formats(),
            include_events: default_include_events(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            success_rate_weight: default_success_weight(),
            recovery_weight: default_recovery_weight(),
            error_density_weight: default_error_weight(),
            recovery_reference_secs: default_recovery_reference_secs(),
            production_intensity_ceiling: default_production_ceiling(),
        }
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            mutation: MutationConfig::default(),
            chaos_replay: ChaosReplayConfig::default(),
            span_mutation: SpanMutationConfig::default(),
            gork_generation: GorkGenerationConfig::default(),
            reporting: ReportingConfig::default(),
            lightweight_mode: LightweightModeConfig::default(),
            scoring: ScoringConfig::default(),
            environments: builtin_environments(),
            environment_applied: false,
        }
    }
}

impl ChaosReplayConfig {
    /// Run length.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Pause between records.
    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }

    /// Per-call target timeout.
    pub fn target_timeout(&self) -> Duration {
        Duration::from_millis(self.target_timeout_ms)
    }

    /// Fault window.
    pub fn fault_duration(&self) -> Duration {
        Duration::from_millis(self.fault_duration_ms)
    }
}

impl ScoringConfig {
    /// Weights in the form the scorer takes.
    pub fn weights(&self) -> ScoreWeights {
        ScoreWeights {
            success_rate: self.success_rate_weight,
            recovery: self.recovery_weight,
            error_density: self.error_density_weight,
            recovery_reference_secs: self.recovery_reference_secs,
        }
    }
}

impl ChaosConfig {
    /// Parse a TOML document. Built-in environments missing from the
    /// document are added; the active environment is not yet applied.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: ChaosConfig = toml::from_str(content)?;
        config.merge_builtin_environments();
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Add built-in environments the configuration does not define itself.
    pub fn merge_builtin_environments(&mut self) {
        for (name, env) in builtin_environments() {
            self.environments.entry(name).or_insert(env);
        }
    }

    /// The active environment's settings, if defined.
    pub fn active_environment(&self) -> Option<&EnvironmentConfig> {
        self.environments.get(&self.environment)
    }

    /// True once [`apply_environment`](Self::apply_environment) has run.
    pub fn environment_applied(&self) -> bool {
        self.environment_applied
    }

    /// Apply the active environment: scale intensities, drop disabled
    /// scenarios, stretch timeouts, cap workers and replace resource limits.
    ///
    /// Applies at most once per configuration. Returns `false` when the
    /// active environment is not defined.
    pub fn apply_environment(&mut self) -> bool {
        if self.environment_applied {
            return true;
        }
        let Some(env) = self.environments.get(&self.environment).cloned() else {
            return false;
        };

        let m = env.intensity_multiplier;
        self.mutation.mutation_rate *= m;
        self.chaos_replay.chaos_intensity *= m;
        self.span_mutation.malformation_intensity *= m;
        self.gork_generation.corruption_rate *= m;

        self.chaos_replay
            .scenarios
            .retain(|s| !env.disabled_scenarios.contains(s));

        let stretched = self.chaos_replay.target_timeout_ms as f64 * env.timeout_multiplier;
        if stretched.is_finite() && stretched >= 0.0 {
            self.chaos_replay.target_timeout_ms = stretched.round() as u64;
        }
        if let Some(workers) = env.parallel_workers {
            self.chaos_replay.concurrency = workers;
        }
        if env.memory_limit.is_some() {
            self.lightweight_mode.memory_limit = env.memory_limit;
        }
        if env.cpu_limit.is_some() {
            self.lightweight_mode.cpu_limit = env.cpu_limit;
        }

        tracing::debug!(
            environment = %self.environment,
            multiplier = m,
            scenarios = self.chaos_replay.scenarios.len(),
            "environment applied"
        );
        self.environment_applied = true;
        true
    }
}
