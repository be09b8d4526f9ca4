//! Scenario handlers.
//!
//! Each [`ScenarioKind`] maps to one [`ScenarioHandler`] in a registry built
//! once per engine. Input scenarios generate corrupted records and feed them
//! to the target; fault scenarios inject a fault and then probe the target;
//! the race scenario submits one record many times at once.

use crate::target::{ReplayTarget, TargetError};
use async_trait::async_trait;
use chaos_config::ChaosConfig;
use chaos_core::{GorkGenerator, MutationEngine, SpanMutator};
use chaos_inject::FaultInjector;
use chaos_types::{
    FaultKind, FaultParams, GorkCategory, GorkFamily, GorkResult, MutationKind, ScenarioKind,
    SpanMalformationKind, Value,
};
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Categories sampled per gork scenario when none are configured.
const GORK_SAMPLE: usize = 6;

/// Most records a mutation scenario takes from the test data.
const RECORD_SAMPLE: usize = 10;

/// Duplicate submissions per race scenario.
const RACE_SUBMISSIONS: usize = 8;

/// Generator and delivery settings shared by every scenario of a run.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    /// Identifier faults are injected against.
    pub target_name: String,
    /// Window of each injected fault.
    pub fault_duration: Duration,
    /// Per-call target timeout.
    pub target_timeout: Duration,
    /// Span malformation intensity.
    pub span_intensity: f64,
    /// Spans per malformed-span scenario and children per corrupted trace.
    pub span_count: usize,
    /// Span malformation kinds; empty means all.
    pub span_kinds: Vec<SpanMalformationKind>,
    /// Oversized span attribute size.
    pub oversized_attribute_bytes: usize,
    /// Gork corruption density.
    pub gork_rate: f64,
    /// Gork categories; empty means a random sample.
    pub gork_categories: Vec<GorkCategory>,
    /// Compression bomb expanded size.
    pub bomb_bytes: usize,
    /// Mutation kinds; empty means all.
    pub mutation_kinds: Vec<MutationKind>,
    /// Field names preferred by security payload injection.
    pub targeted_fields: Vec<String>,
    /// Mutation recursion limit.
    pub max_depth: usize,
    /// Overflow injection size.
    pub overflow_bytes: usize,
}

impl ScenarioSettings {
    /// Derive settings from a loaded configuration.
    pub fn from_config(config: &ChaosConfig) -> Self {
        Self {
            target_name: "replay-engine".to_string(),
            fault_duration: config.chaos_replay.fault_duration(),
            target_timeout: config.chaos_replay.target_timeout(),
            span_intensity: config.span_mutation.malformation_intensity,
            span_count: config.span_mutation.trace_span_count,
            span_kinds: config.span_mutation.enabled_kinds.clone(),
            oversized_attribute_bytes: config.span_mutation.oversized_attribute_bytes,
            gork_rate: config.gork_generation.corruption_rate,
            gork_categories: config.gork_generation.enabled_categories.clone(),
            bomb_bytes: config.gork_generation.bomb_size_mb * 1024 * 1024,
            mutation_kinds: config.mutation.enabled_kinds.clone(),
            targeted_fields: config.mutation.targeted_fields.clone(),
            max_depth: config.mutation.max_depth,
            overflow_bytes: config.mutation.overflow_bytes,
        }
    }
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self::from_config(&ChaosConfig::default())
    }
}

/// Everything a handler may use. Generators are owned by the scenario task,
/// so no two tasks share a PRNG.
pub struct ScenarioCtx<'a> {
    /// System under test.
    pub target: &'a dyn ReplayTarget,
    /// Shared fault injector.
    pub injector: &'a FaultInjector,
    /// Run settings.
    pub settings: &'a ScenarioSettings,
    /// Replay test data.
    pub records: &'a [Value],
    /// Record mutator.
    pub mutation: MutationEngine,
    /// Span malformer.
    pub spans: SpanMutator,
    /// Payload garbler.
    pub gork: GorkGenerator,
    /// Selection randomness.
    pub rng: StdRng,
}

impl<'a> ScenarioCtx<'a> {
    /// Build a context with generators seeded from `seed`.
    pub fn new(
        target: &'a dyn ReplayTarget,
        injector: &'a FaultInjector,
        settings: &'a ScenarioSettings,
        records: &'a [Value],
        seed: u64,
    ) -> Self {
        Self {
            target,
            injector,
            settings,
            records,
            mutation: MutationEngine::new(seed)
                .with_max_depth(settings.max_depth)
                .with_overflow_bytes(settings.overflow_bytes),
            spans: SpanMutator::new(seed.wrapping_add(1))
                .with_oversized_bytes(settings.oversized_attribute_bytes),
            gork: GorkGenerator::new(seed.wrapping_add(2)).with_bomb_bytes(settings.bomb_bytes),
            rng: StdRng::seed_from_u64(seed.wrapping_add(3)),
        }
    }

    /// Serialized first test record, used as the gork seed payload.
    fn payload(&self) -> Vec<u8> {
        self.records
            .first()
            .and_then(|r| r.to_json().ok())
            .and_then(|json| serde_json::to_vec(&json).ok())
            .unwrap_or_else(|| br#"{"message":"chaos probe","level":"info"}"#.to_vec())
    }

    fn sample_records(&mut self) -> Vec<Value> {
        if self.records.is_empty() {
            return vec![self.spans.base_span()];
        }
        self.records.iter().take(RECORD_SAMPLE).cloned().collect()
    }

    fn probe_record(&mut self) -> Value {
        match self.records.first() {
            Some(record) => record.clone(),
            None => self.spans.base_span(),
        }
    }

    /// Send one record with the run's timeout.
    pub async fn send(&self, record: &Value) -> Result<(), TargetError> {
        let timeout = self.settings.target_timeout;
        match tokio::time::timeout(timeout, self.target.process(record)).await {
            Ok(result) => result,
            Err(_) => Err(TargetError::Timeout(timeout)),
        }
    }

    /// Send every input; succeeds only if the target accepted all of them.
    pub async fn deliver(&self, inputs: &[Value], outcome: &mut ScenarioOutcome) {
        let mut rejected = 0u64;
        for input in inputs {
            if let Err(e) = self.send(input).await {
                rejected += 1;
                outcome.fail(e.to_string());
            }
        }
        outcome.param("inputs_sent", inputs.len() as i64);
        outcome.param("inputs_rejected", rejected as i64);
    }
}

/// What a handler reports back; becomes one [`ChaosEvent`](chaos_types::ChaosEvent).
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    /// Whether the target came through cleanly.
    pub success: bool,
    /// First error observed.
    pub error: Option<String>,
    /// Details for the event.
    pub parameters: BTreeMap<String, Value>,
}

impl ScenarioOutcome {
    /// A successful outcome with no details yet.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            parameters: BTreeMap::new(),
        }
    }

    /// Mark failed, keeping the first error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }

    /// Record a detail.
    pub fn param(&mut self, key: &str, value: impl Into<Value>) {
        self.parameters.insert(key.to_string(), value.into());
    }
}

/// Executes one scenario kind.
#[async_trait]
pub trait ScenarioHandler: Send + Sync {
    /// Run once and report the outcome. Must not panic on bad input.
    async fn execute(&self, ctx: &mut ScenarioCtx<'_>) -> ScenarioOutcome;
}

/// Kind to handler table.
pub struct ScenarioRegistry {
    handlers: HashMap<ScenarioKind, Arc<dyn ScenarioHandler>>,
}

impl std::fmt::Debug for ScenarioRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioRegistry {
    /// Registry with the built-in handler for every kind.
    pub fn new() -> Self {
        let handlers = ScenarioKind::ALL
            .iter()
            .map(|&kind| (kind, handler_for(kind)))
            .collect();
        Self { handlers }
    }

    /// Replace the handler for `kind`.
    pub fn register(&mut self, kind: ScenarioKind, handler: Arc<dyn ScenarioHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: ScenarioKind) -> Option<Arc<dyn ScenarioHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

fn handler_for(kind: ScenarioKind) -> Arc<dyn ScenarioHandler> {
    if let Some(fault) = kind.fault() {
        return Arc::new(FaultScenario { fault });
    }
    match kind {
        ScenarioKind::RaceCondition => Arc::new(RaceScenario),
        _ => Arc::new(InputScenario { kind }),
    }
}

// =========================================================================
// Input scenarios
// =========================================================================

struct InputScenario {
    kind: ScenarioKind,
}

#[async_trait]
impl ScenarioHandler for InputScenario {
    async fn execute(&self, ctx: &mut ScenarioCtx<'_>) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::ok();
        match generate_inputs(self.kind, ctx, &mut outcome) {
            Ok(inputs) => ctx.deliver(&inputs, &mut outcome).await,
            Err(e) => {
                tracing::warn!(scenario = %self.kind, error = %e, "input generation failed");
                outcome.fail(format!("input generation failed: {e}"));
            }
        }
        outcome
    }
}

fn bytes_inputs(
    results: impl IntoIterator<Item = GorkResult>,
    outcome: &mut ScenarioOutcome,
) -> Vec<Value> {
    let mut categories = Vec::new();
    let mut expected = Vec::new();
    let inputs = results
        .into_iter()
        .map(|r| {
            categories.push(Value::from(r.category.as_str()));
            for failure in &r.expected_failures {
                let name = Value::from(failure.as_str());
                if !expected.contains(&name) {
                    expected.push(name);
                }
            }
            Value::Bytes(r.gorked)
        })
        .collect();
    outcome.param("categories", Value::List(categories));
    outcome.param("expected_failures", Value::List(expected));
    inputs
}

fn generate_inputs(
    kind: ScenarioKind,
    ctx: &mut ScenarioCtx<'_>,
    outcome: &mut ScenarioOutcome,
) -> Result<Vec<Value>, String> {
    let settings = ctx.settings;
    let span_kinds = (!settings.span_kinds.is_empty()).then_some(settings.span_kinds.as_slice());

    match kind {
        ScenarioKind::MalformedSpans => {
            let mut inputs = Vec::with_capacity(settings.span_count);
            let mut applied = 0usize;
            for _ in 0..settings.span_count.max(1) {
                let (span, malformations) = ctx
                    .spans
                    .create_malformed_span(None, span_kinds, settings.span_intensity)
                    .map_err(|e| e.to_string())?;
                applied += malformations.len();
                inputs.push(span);
            }
            outcome.param("malformations", applied as i64);
            Ok(inputs)
        }
        ScenarioKind::CorruptedTraces => {
            let trace = ctx
                .spans
                .create_malformed_trace(settings.span_count, settings.span_intensity)
                .map_err(|e| e.to_string())?;
            outcome.param("trace_id", trace.trace_id.as_str());
            outcome.param("malformations", trace.malformations.len() as i64);
            Ok(trace.spans)
        }
        ScenarioKind::GorkPayloads => {
            let payload = ctx.payload();
            let categories: Vec<GorkCategory> = if settings.gork_categories.is_empty() {
                let pool: Vec<GorkCategory> = GorkCategory::ALL
                    .iter()
                    .copied()
                    .filter(|c| *c != GorkCategory::CompressionBomb)
                    .collect();
                pool.choose_multiple(&mut ctx.rng, GORK_SAMPLE).copied().collect()
            } else {
                settings.gork_categories.clone()
            };
            let results = categories
                .into_iter()
                .map(|c| ctx.gork.generate_gork(&payload, Some(c), settings.gork_rate))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;
            Ok(bytes_inputs(results, outcome))
        }
        ScenarioKind::MutatedRecords => {
            let mut inputs = Vec::new();
            for record in &ctx.sample_records() {
                let result = ctx.mutation.mutate(record, &settings.mutation_kinds, 1.0);
                if !result.success {
                    outcome.param("mutation_error", result.error.unwrap_or_default());
                    continue;
                }
                inputs.push(result.mutated);
            }
            outcome.param("records_mutated", inputs.len() as i64);
            Ok(inputs)
        }
        ScenarioKind::SecurityPayloads => {
            let targets: Vec<&str> = settings.targeted_fields.iter().map(String::as_str).collect();
            let mut inputs = Vec::new();
            for record in &ctx.sample_records() {
                let mut result = ctx
                    .mutation
                    .mutate_targeted(record, &targets, MutationKind::SECURITY, 1.0);
                if result.skipped() {
                    // No targeted field present; inject anywhere.
                    result = ctx.mutation.mutate(record, MutationKind::SECURITY, 1.0);
                }
                if result.success {
                    inputs.push(result.mutated);
                }
            }
            outcome.param("records_mutated", inputs.len() as i64);
            Ok(inputs)
        }
        ScenarioKind::UnicodeHazards => {
            let payload = ctx.payload();
            let mut inputs = bytes_inputs(
                ctx.gork
                    .generate_family(&payload, GorkFamily::Unicode, settings.gork_rate),
                outcome,
            );
            if let Some(record) = ctx.records.first() {
                let result = ctx.mutation.mutate_with(record, MutationKind::UnicodeCorruption);
                if result.success {
                    inputs.push(result.mutated);
                }
            }
            Ok(inputs)
        }
        ScenarioKind::EncodingCorruption => {
            let payload = ctx.payload();
            let mut results = ctx
                .gork
                .generate_family(&payload, GorkFamily::Encoding, settings.gork_rate);
            results.extend(
                ctx.gork
                    .generate_family(&payload, GorkFamily::Format, settings.gork_rate),
            );
            Ok(bytes_inputs(results, outcome))
        }
        ScenarioKind::CompressionBomb => {
            let payload = ctx.payload();
            let bomb = ctx
                .gork
                .generate_gork(&payload, Some(GorkCategory::CompressionBomb), settings.gork_rate)
                .map_err(|e| e.to_string())?;
            Ok(bytes_inputs([bomb], outcome))
        }
        ScenarioKind::SlowNetwork
        | ScenarioKind::NetworkPartition
        | ScenarioKind::PacketLoss
        | ScenarioKind::ConnectionReset
        | ScenarioKind::MemoryPressure
        | ScenarioKind::CpuSpike
        | ScenarioKind::DiskFull
        | ScenarioKind::FdExhaustion
        | ScenarioKind::ServiceUnavailable
        | ScenarioKind::DependencyFailure
        | ScenarioKind::ClockSkew
        | ScenarioKind::RaceCondition => Err(format!("{kind} does not generate inputs")),
    }
}

// =========================================================================
// Fault scenarios
// =========================================================================

struct FaultScenario {
    fault: FaultKind,
}

#[async_trait]
impl ScenarioHandler for FaultScenario {
    async fn execute(&self, ctx: &mut ScenarioCtx<'_>) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::ok();
        let settings = ctx.settings;
        let injected = ctx
            .injector
            .inject_fault(
                self.fault,
                &settings.target_name,
                FaultParams::default(),
                settings.fault_duration,
            )
            .await;

        outcome.param("fault", self.fault.as_str());
        outcome.param("fault_ms", injected.duration.as_millis() as i64);
        if let Some(effect) = &injected.effect {
            outcome.param("effect", effect.to_string());
        }
        if !injected.success {
            outcome.fail(injected.error.unwrap_or_else(|| "fault injection failed".into()));
            return outcome;
        }

        // The target should be healthy again once the fault window closes.
        let probe = ctx.probe_record();
        match ctx.send(&probe).await {
            Ok(()) => outcome.param("recovered", true),
            Err(e) => {
                outcome.param("recovered", false);
                outcome.fail(e.to_string());
            }
        }
        outcome
    }
}

// =========================================================================
// Race scenario
// =========================================================================

struct RaceScenario;

#[async_trait]
impl ScenarioHandler for RaceScenario {
    async fn execute(&self, ctx: &mut ScenarioCtx<'_>) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::ok();
        let record = ctx.probe_record();
        let shared: &ScenarioCtx<'_> = ctx;
        let results = join_all((0..RACE_SUBMISSIONS).map(|_| shared.send(&record))).await;

        let rejected = results.iter().filter(|r| r.is_err()).count();
        if let Some(Err(e)) = results.into_iter().find(Result::is_err) {
            outcome.fail(e.to_string());
        }
        outcome.param("submissions", RACE_SUBMISSIONS as i64);
        outcome.param("rejected", rejected as i64);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MockTarget;

    fn settings() -> ScenarioSettings {
        ScenarioSettings {
            fault_duration: Duration::from_millis(20),
            oversized_attribute_bytes: 1024,
            bomb_bytes: 64 * 1024,
            ..ScenarioSettings::default()
        }
    }

    fn records() -> Vec<Value> {
        vec![Value::object([
            ("prompt", Value::from("summarize this")),
            ("token", Value::from("abc123")),
            ("count", Value::Int(3)),
        ])]
    }

    async fn run(kind: ScenarioKind, target: &MockTarget) -> ScenarioOutcome {
        let injector = FaultInjector::new(1);
        let settings = settings();
        let records = records();
        let mut ctx = ScenarioCtx::new(target, &injector, &settings, &records, 7);
        let handler = ScenarioRegistry::new().get(kind).unwrap();
        handler.execute(&mut ctx).await
    }

    #[tokio::test]
    async fn every_scenario_succeeds_against_healthy_target() {
        for kind in ScenarioKind::ALL {
            if matches!(kind, ScenarioKind::MemoryPressure | ScenarioKind::CpuSpike) {
                continue;
            }
            let target = MockTarget::new();
            let outcome = run(*kind, &target).await;
            assert!(outcome.success, "{kind}: {:?}", outcome.error);
            assert!(target.call_count() > 0, "{kind} never reached the target");
        }
    }

    #[tokio::test]
    async fn failing_target_fails_scenarios() {
        let target = MockTarget::failing("rejected");
        let outcome = run(ScenarioKind::MalformedSpans, &target).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("target rejected record: rejected"));
        assert_eq!(
            outcome.parameters.get("inputs_rejected"),
            outcome.parameters.get("inputs_sent")
        );
    }

    #[tokio::test]
    async fn fault_scenario_records_fault() {
        let target = MockTarget::new();
        let outcome = run(ScenarioKind::NetworkPartition, &target).await;
        assert_eq!(
            outcome.parameters.get("fault"),
            Some(&Value::from("network_partition"))
        );
        assert!(outcome.parameters.contains_key("effect"));
        assert_eq!(target.call_count(), 1);
    }

    #[tokio::test]
    async fn race_submits_duplicates() {
        let target = MockTarget::new();
        target.fail_every(4);
        let outcome = run(ScenarioKind::RaceCondition, &target).await;
        assert!(!outcome.success);
        assert_eq!(target.call_count(), RACE_SUBMISSIONS as u64);
        assert_eq!(outcome.parameters.get("rejected"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn gork_scenarios_send_bytes() {
        let target = MockTarget::new();
        target.capture_records();
        run(ScenarioKind::GorkPayloads, &target).await;
        let captured = target.captured();
        assert_eq!(captured.len(), GORK_SAMPLE);
        assert!(captured.iter().all(|v| matches!(v, Value::Bytes(_))));
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let target = MockTarget::new();
        target.set_latency(Duration::from_millis(200));
        let injector = FaultInjector::new(1);
        let settings = ScenarioSettings {
            target_timeout: Duration::from_millis(20),
            ..settings()
        };
        let records = records();
        let mut ctx = ScenarioCtx::new(&target, &injector, &settings, &records, 7);
        let outcome = ScenarioRegistry::new()
            .get(ScenarioKind::MutatedRecords)
            .unwrap()
            .execute(&mut ctx)
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    struct Custom;

    #[async_trait]
    impl ScenarioHandler for Custom {
        async fn execute(&self, _ctx: &mut ScenarioCtx<'_>) -> ScenarioOutcome {
            let mut outcome = ScenarioOutcome::ok();
            outcome.param("custom", true);
            outcome
        }
    }

    #[tokio::test]
    async fn registry_accepts_overrides() {
        let mut registry = ScenarioRegistry::new();
        registry.register(ScenarioKind::DiskFull, Arc::new(Custom));
        let target = MockTarget::new();
        let injector = FaultInjector::new(1);
        let settings = settings();
        let mut ctx = ScenarioCtx::new(&target, &injector, &settings, &[], 1);
        let outcome = registry.get(ScenarioKind::DiskFull).unwrap().execute(&mut ctx).await;
        assert_eq!(outcome.parameters.get("custom"), Some(&Value::Bool(true)));
        assert_eq!(target.call_count(), 0);
    }
}
