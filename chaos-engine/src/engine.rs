//! Chaos replay engine.
//!
//! One run moves through `Idle -> CollectingMetrics -> Running -> Scoring ->
//! Done`. While running, `concurrency` replay workers loop over the test
//! data and one task per requested scenario fires after a random pre-delay.
//! The run duration is an absolute deadline: when it passes, every task is
//! cancelled, given a short grace period, then aborted.

use crate::error::EngineError;
use crate::metrics::MetricsCollector;
use crate::scenarios::{
    ScenarioCtx, ScenarioHandler, ScenarioOutcome, ScenarioRegistry, ScenarioSettings,
};
use crate::target::{ReplayTarget, TargetError};
use chaos_config::{ChaosConfig, ScenarioCompatibility};
use chaos_core::{MutationEngine, SpanMutator};
use chaos_inject::FaultInjector;
use chaos_types::time::unix_millis_now;
use chaos_types::{ChaosEvent, ChaosTestResult, MutationKind, ScenarioKind, Value};
use futures_util::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time tasks get to observe cancellation before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No run started yet.
    Idle,
    /// Resetting the target and preparing test data.
    CollectingMetrics,
    /// Workers and scenarios active.
    Running,
    /// Computing the result.
    Scoring,
    /// Last run finished.
    Done,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::CollectingMetrics => "collecting_metrics",
            EngineState::Running => "running",
            EngineState::Scoring => "scoring",
            EngineState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-worker replay settings.
#[derive(Debug, Clone)]
struct WorkerSettings {
    intensity: f64,
    mutation_kinds: Vec<MutationKind>,
    max_depth: usize,
    overflow_bytes: usize,
    record_delay: Duration,
    target_timeout: Duration,
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Orchestrates chaos runs against one target.
pub struct ChaosReplayEngine {
    config: ChaosConfig,
    target: Arc<dyn ReplayTarget>,
    injector: Arc<FaultInjector>,
    registry: ScenarioRegistry,
    settings: Arc<ScenarioSettings>,
    state: watch::Sender<EngineState>,
    running: AtomicBool,
}

impl fmt::Debug for ChaosReplayEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChaosReplayEngine")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ChaosReplayEngine {
    /// Create an engine for `target`.
    ///
    /// Seeds the fault injector from `chaos_replay.seed` when set.
    pub fn new(config: ChaosConfig, target: Arc<dyn ReplayTarget>) -> Self {
        let injector = match config.chaos_replay.seed {
            Some(seed) => FaultInjector::new(seed),
            None => FaultInjector::from_entropy(),
        };
        let settings = Arc::new(ScenarioSettings::from_config(&config));
        let (state, _) = watch::channel(EngineState::Idle);
        Self {
            config,
            target,
            injector: Arc::new(injector),
            registry: ScenarioRegistry::new(),
            settings,
            state,
            running: AtomicBool::new(false),
        }
    }

    /// Share an existing injector, e.g. one a
    /// [`ChaosMonkey`](chaos_inject::ChaosMonkey) also uses.
    pub fn with_injector(mut self, injector: Arc<FaultInjector>) -> Self {
        self.injector = injector;
        self
    }

    /// Replace the handler for one scenario kind.
    pub fn with_handler(mut self, kind: ScenarioKind, handler: Arc<dyn ScenarioHandler>) -> Self {
        self.registry.register(kind, handler);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// The injector fault scenarios go through.
    pub fn injector(&self) -> &Arc<FaultInjector> {
        &self.injector
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: EngineState) {
        debug!(state = %state, "engine state");
        self.state.send_replace(state);
    }

    /// Run the configured scenarios for the configured duration.
    pub async fn run_configured(&self, test_name: &str) -> Result<ChaosTestResult, EngineError> {
        let replay = &self.config.chaos_replay;
        self.run_chaos_test(
            test_name,
            &replay.scenarios,
            replay.duration(),
            None,
            replay.concurrency,
        )
        .await
    }

    /// Run one chaos test.
    ///
    /// `test_data` defaults to one valid trace. Target and scenario failures
    /// are recorded in the result; only misuse returns an error.
    pub async fn run_chaos_test(
        &self,
        test_name: &str,
        scenarios: &[ScenarioKind],
        duration: Duration,
        test_data: Option<Vec<Value>>,
        concurrency: usize,
    ) -> Result<ChaosTestResult, EngineError> {
        if concurrency == 0 {
            return Err(EngineError::InvalidConcurrency);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        let started = Instant::now();
        let base_seed = self.config.chaos_replay.seed.unwrap_or_else(rand::random);

        self.set_state(EngineState::CollectingMetrics);
        info!(
            test = test_name,
            scenarios = scenarios.len(),
            duration_ms = duration.as_millis() as u64,
            concurrency,
            seed = base_seed,
            "chaos test starting"
        );
        let compatibility = ScenarioCompatibility::check(scenarios);
        for conflict in &compatibility.conflicts {
            warn!(
                first = %conflict.first,
                second = %conflict.second,
                risk = conflict.risk,
                "conflicting scenarios scheduled together"
            );
        }
        if let Err(e) = self.target.reset().await {
            warn!(error = %e, "target reset failed, continuing");
        }
        let records = Arc::new(test_data.unwrap_or_else(|| {
            SpanMutator::new(base_seed).valid_trace(self.settings.span_count)
        }));
        let metrics = Arc::new(MetricsCollector::new());

        self.set_state(EngineState::Running);
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let worker = WorkerSettings {
            intensity: self.config.chaos_replay.chaos_intensity,
            mutation_kinds: self.config.mutation.enabled_kinds.clone(),
            max_depth: self.settings.max_depth,
            overflow_bytes: self.settings.overflow_bytes,
            record_delay: self.config.chaos_replay.record_delay(),
            target_timeout: self.settings.target_timeout,
        };
        for id in 0..concurrency {
            tasks.spawn(replay_worker(
                id,
                base_seed.wrapping_add(id as u64),
                Arc::clone(&records),
                Arc::clone(&self.target),
                Arc::clone(&metrics),
                worker.clone(),
                cancel.clone(),
            ));
        }
        for (index, &kind) in scenarios.iter().enumerate() {
            let Some(handler) = self.registry.get(kind) else {
                warn!(scenario = %kind, "no handler registered, skipping");
                continue;
            };
            tasks.spawn(scenario_task(
                kind,
                handler,
                base_seed.wrapping_mul(31).wrapping_add(1000 + index as u64),
                duration,
                ScenarioResources {
                    target: Arc::clone(&self.target),
                    injector: Arc::clone(&self.injector),
                    settings: Arc::clone(&self.settings),
                    records: Arc::clone(&records),
                    metrics: Arc::clone(&metrics),
                },
                cancel.clone(),
            ));
        }

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                joined = tasks.join_next() => match joined {
                    Some(Err(e)) if e.is_panic() => error!(error = %e, "chaos task panicked"),
                    Some(_) => {}
                    None => break,
                },
            }
        }
        cancel.cancel();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "tasks ignored cancellation, aborting");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        self.set_state(EngineState::Scoring);
        let result = ChaosTestResult::new(
            test_name,
            metrics.take_events(),
            started.elapsed(),
            metrics.snapshot(),
            metrics.recovery_time(),
            &self.config.scoring.weights(),
        );
        self.set_state(EngineState::Done);
        info!(
            test = test_name,
            events = result.event_count,
            errors = result.error_count,
            score = result.resilience_score,
            "chaos test finished"
        );
        Ok(result)
    }
}

async fn replay_worker(
    id: usize,
    seed: u64,
    records: Arc<Vec<Value>>,
    target: Arc<dyn ReplayTarget>,
    metrics: Arc<MetricsCollector>,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    if records.is_empty() {
        return;
    }
    let mut mutation = MutationEngine::new(seed)
        .with_max_depth(settings.max_depth)
        .with_overflow_bytes(settings.overflow_bytes);
    debug!(worker = id, "replay worker started");

    'replay: loop {
        for record in records.iter() {
            if cancel.is_cancelled() {
                break 'replay;
            }
            let mutated = mutation.mutate(record, &settings.mutation_kinds, settings.intensity);
            if !mutated.success {
                metrics.record_mutation_failure();
            }
            let changed = mutated.changed();
            let payload = if changed { &mutated.mutated } else { record };

            let sent = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'replay,
                r = tokio::time::timeout(settings.target_timeout, target.process(payload)) => {
                    r.unwrap_or(Err(TargetError::Timeout(settings.target_timeout)))
                }
            };
            metrics.record_replay(changed, outcome.is_ok(), sent.elapsed());

            if settings.record_delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'replay,
                _ = tokio::time::sleep(settings.record_delay) => {}
            }
        }
    }
    debug!(worker = id, "replay worker stopped");
}

/// Shared handles a scenario task needs.
struct ScenarioResources {
    target: Arc<dyn ReplayTarget>,
    injector: Arc<FaultInjector>,
    settings: Arc<ScenarioSettings>,
    records: Arc<Vec<Value>>,
    metrics: Arc<MetricsCollector>,
}

async fn scenario_task(
    kind: ScenarioKind,
    handler: Arc<dyn ScenarioHandler>,
    seed: u64,
    run_duration: Duration,
    res: ScenarioResources,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let window_ms = (run_duration / 4).as_millis() as u64;
    let pre_delay = if window_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rng.gen_range(0..window_ms))
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(scenario = %kind, "run ended before scenario started");
            return;
        }
        _ = tokio::time::sleep(pre_delay) => {}
    }

    debug!(scenario = %kind, "scenario starting");
    let timestamp_ms = unix_millis_now();
    let started = Instant::now();
    let mut ctx = ScenarioCtx::new(
        res.target.as_ref(),
        &res.injector,
        &res.settings,
        &res.records,
        seed,
    );
    let mut cancelled = false;
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            cancelled = true;
            let mut outcome = ScenarioOutcome::ok();
            outcome.fail("scenario cancelled at run deadline");
            outcome
        }
        run = AssertUnwindSafe(handler.execute(&mut ctx)).catch_unwind() => {
            run.unwrap_or_else(|_| {
                let mut outcome = ScenarioOutcome::ok();
                outcome.fail("scenario handler panicked");
                outcome
            })
        }
    };
    let duration = started.elapsed();
    if cancelled {
        debug!(scenario = %kind, duration_ms = duration.as_millis() as u64, "scenario cut off at deadline");
    } else if outcome.success {
        debug!(scenario = %kind, duration_ms = duration.as_millis() as u64, "scenario passed");
    } else {
        info!(scenario = %kind, error = ?outcome.error, "scenario failed");
    }

    res.metrics.record_event(ChaosEvent {
        scenario: kind,
        timestamp_ms,
        duration,
        target: res.settings.target_name.clone(),
        parameters: outcome.parameters,
        success: outcome.success,
        error: outcome.error,
        cancelled,
    });
}
