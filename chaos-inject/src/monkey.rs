//! Background chaos monkey.
//!
//! Wakes on a fixed interval and, with a configured probability, injects a
//! random fault against a random target. Runs until [`ChaosMonkey::stop`]
//! or until the monkey is dropped.

use crate::error::FaultError;
use crate::injector::FaultInjector;
use chaos_types::FaultKind;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Chaos monkey settings.
#[derive(Debug, Clone)]
pub struct ChaosMonkeyConfig {
    /// Time between wake-ups.
    pub interval: Duration,
    /// Chance of injecting on each wake-up.
    pub probability: f64,
    /// Target identifiers to pick from.
    pub targets: Vec<String>,
    /// Fault kinds to pick from. Empty means every kind that does not hold
    /// real memory or CPU.
    pub kinds: Vec<FaultKind>,
    /// Window for each injected fault.
    pub fault_duration: Duration,
    /// Seed for target/fault selection.
    pub seed: Option<u64>,
}

impl Default for ChaosMonkeyConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            probability: 0.1,
            targets: vec!["replay-engine".to_string()],
            kinds: Vec::new(),
            fault_duration: Duration::from_millis(100),
            seed: None,
        }
    }
}

impl ChaosMonkeyConfig {
    fn fault_pool(&self) -> Vec<FaultKind> {
        if self.kinds.is_empty() {
            FaultKind::ALL
                .iter()
                .copied()
                .filter(|k| !k.is_resource_intensive())
                .collect()
        } else {
            self.kinds.clone()
        }
    }
}

/// Periodic random fault injection on a background task.
#[derive(Debug)]
pub struct ChaosMonkey {
    injector: Arc<FaultInjector>,
    config: ChaosMonkeyConfig,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<u64>>,
}

impl ChaosMonkey {
    /// Create a stopped monkey sharing `injector`.
    pub fn new(injector: Arc<FaultInjector>, config: ChaosMonkeyConfig) -> Self {
        Self {
            injector,
            config,
            cancel: None,
            handle: None,
        }
    }

    /// The injector every fault goes through.
    pub fn injector(&self) -> &Arc<FaultInjector> {
        &self.injector
    }

    /// True between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the background loop. Must be called inside a Tokio runtime.
    pub fn start(&mut self) -> Result<(), FaultError> {
        if self.handle.is_some() {
            return Err(FaultError::AlreadyRunning);
        }
        if self.config.targets.is_empty() {
            return Err(FaultError::NoTargets);
        }
        if !(0.0..=1.0).contains(&self.config.probability) {
            return Err(FaultError::InvalidProbability(self.config.probability));
        }

        let cancel = CancellationToken::new();
        let injector = Arc::clone(&self.injector);
        let config = self.config.clone();
        let token = cancel.clone();

        info!(
            interval_ms = config.interval.as_millis() as u64,
            probability = config.probability,
            targets = config.targets.len(),
            "chaos monkey started"
        );
        self.handle = Some(tokio::spawn(monkey_loop(injector, config, token)));
        self.cancel = Some(cancel);
        Ok(())
    }

    /// Stop the loop and wait for it. Returns the number of faults injected.
    pub async fn stop(&mut self) -> u64 {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        let injected = match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        };
        info!(injected, "chaos monkey stopped");
        injected
    }
}

impl Drop for ChaosMonkey {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

async fn monkey_loop(
    injector: Arc<FaultInjector>,
    config: ChaosMonkeyConfig,
    cancel: CancellationToken,
) -> u64 {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let pool = config.fault_pool();
    let period = config.interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut injected = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !rng.gen_bool(config.probability) {
                    continue;
                }
                let (Some(target), Some(kind)) = (config.targets.choose(&mut rng), pool.choose(&mut rng)) else {
                    continue;
                };
                debug!(fault = %kind, target = %target, "chaos monkey striking");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = injector.inject_fault(*kind, target, Default::default(), config.fault_duration) => {
                        injected += 1;
                    }
                }
            }
        }
    }
    injected
}
