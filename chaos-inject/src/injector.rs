//! Fault injector.
//!
//! Every fault is an async operation bounded by the requested duration.
//! Network, service and data faults are simulated with sleeps and synthetic
//! [`SimulatedFault`] effects; memory and CPU faults consume real resources
//! for the fault window.

use crate::error::FaultError;
use chaos_types::time::unix_millis_now;
use chaos_types::{FaultInjectionResult, FaultKind, FaultParams, SimulatedFault};
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Largest allocation a memory fault may make.
pub const DEFAULT_MEMORY_CAP_MB: usize = 512;

/// Default allocation for memory exhaustion.
pub const DEFAULT_MEMORY_MB: usize = 64;

/// Default simulated packet/request count.
pub const DEFAULT_OPERATIONS: u32 = 100;

/// Default firing probability for probability-gated faults.
pub const DEFAULT_PROBABILITY: f64 = 0.5;

/// Default bandwidth cap.
pub const DEFAULT_RATE_KBIT: u64 = 256;

/// Dependencies a dependency-failure fault may name.
const DEPENDENCIES: &[&str] = &["database", "cache", "auth-service", "message-queue", "object-store"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Aggregate counts over an injector's history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultStats {
    /// Injections recorded.
    pub total: u64,
    /// Injections that completed.
    pub succeeded: u64,
    /// Injections that could not be carried out.
    pub failed: u64,
    /// Injections that inflicted a synthetic failure.
    pub with_effect: u64,
    /// Injections per kind.
    pub per_kind: BTreeMap<FaultKind, u64>,
}

/// Simulates faults against named targets and records every injection.
///
/// Safe to share behind an [`Arc`]; the PRNG and history are internally
/// locked, and no lock is held across an await.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<StdRng>,
    history: Mutex<Vec<FaultInjectionResult>>,
    memory_cap_mb: usize,
}

impl FaultInjector {
    /// Create an injector with a deterministic seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            history: Mutex::new(Vec::new()),
            memory_cap_mb: DEFAULT_MEMORY_CAP_MB,
        }
    }

    /// Create an injector seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Cap the allocation size of memory faults.
    pub fn with_memory_cap_mb(mut self, cap_mb: usize) -> Self {
        self.memory_cap_mb = cap_mb;
        self
    }

    fn roll<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        f(&mut lock(&self.rng))
    }

    /// Inject one fault against `target` for at most `duration`.
    ///
    /// Never fails: harness errors come back as `success = false`.
    pub async fn inject_fault(
        &self,
        kind: FaultKind,
        target: &str,
        params: FaultParams,
        duration: Duration,
    ) -> FaultInjectionResult {
        let started_at_ms = unix_millis_now();
        let started = Instant::now();
        tracing::debug!(fault = %kind, target, ?duration, "injecting fault");

        let mut effective = params;
        let outcome = self.run(kind, target, &mut effective, duration).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(effect) => {
                if let Some(effect) = &effect {
                    tracing::info!(fault = %kind, target, effect = %effect, "fault inflicted");
                }
                FaultInjectionResult {
                    kind,
                    target: target.to_string(),
                    params: effective,
                    started_at_ms,
                    duration: elapsed,
                    success: true,
                    error: None,
                    effect,
                }
            }
            Err(e) => {
                tracing::warn!(fault = %kind, target, error = %e, "fault injection failed");
                FaultInjectionResult {
                    kind,
                    target: target.to_string(),
                    params: effective,
                    started_at_ms,
                    duration: elapsed,
                    success: false,
                    error: Some(e.to_string()),
                    effect: None,
                }
            }
        };
        lock(&self.history).push(result.clone());
        result
    }

    /// Inject a fault chosen from `kinds` (every kind when empty).
    pub async fn inject_random_fault(
        &self,
        kinds: &[FaultKind],
        target: &str,
        duration: Duration,
    ) -> FaultInjectionResult {
        let pool = if kinds.is_empty() { FaultKind::ALL } else { kinds };
        let kind = self.roll(|rng| pool.choose(rng).copied().unwrap_or(FaultKind::NetworkDelay));
        self.inject_fault(kind, target, FaultParams::default(), duration)
            .await
    }

    /// Inject faults one after another, in order.
    pub async fn inject_sequence(
        &self,
        faults: &[(FaultKind, FaultParams)],
        target: &str,
        duration: Duration,
    ) -> Vec<FaultInjectionResult> {
        let mut results = Vec::with_capacity(faults.len());
        for (kind, params) in faults {
            results.push(
                self.inject_fault(*kind, target, params.clone(), duration)
                    .await,
            );
        }
        results
    }

    /// Inject faults simultaneously. Results keep the input order.
    pub async fn inject_concurrent(
        &self,
        faults: &[(FaultKind, FaultParams)],
        target: &str,
        duration: Duration,
    ) -> Vec<FaultInjectionResult> {
        join_all(
            faults
                .iter()
                .map(|(kind, params)| self.inject_fault(*kind, target, params.clone(), duration)),
        )
        .await
    }

    /// Snapshot of every injection so far.
    pub fn history(&self) -> Vec<FaultInjectionResult> {
        lock(&self.history).clone()
    }

    /// Forget recorded injections.
    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Counts over the recorded history.
    pub fn stats(&self) -> FaultStats {
        let history = lock(&self.history);
        let mut stats = FaultStats::default();
        for result in history.iter() {
            stats.total += 1;
            if result.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            if result.effect.is_some() {
                stats.with_effect += 1;
            }
            *stats.per_kind.entry(result.kind).or_default() += 1;
        }
        stats
    }

    async fn run(
        &self,
        kind: FaultKind,
        target: &str,
        params: &mut FaultParams,
        duration: Duration,
    ) -> Result<Option<SimulatedFault>, FaultError> {
        if let Some(p) = params.probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(FaultError::InvalidProbability(p));
            }
        }

        match kind {
            FaultKind::NetworkDelay | FaultKind::ServiceLatency => {
                let latency = *params
                    .latency_ms
                    .get_or_insert_with(|| self.roll(|rng| rng.gen_range(50..500)));
                sleep_within(Duration::from_millis(latency), duration).await;
                Ok(None)
            }
            FaultKind::NetworkTimeout => {
                tokio::time::sleep(duration).await;
                Ok(Some(SimulatedFault::Timeout {
                    after_ms: duration.as_millis() as u64,
                }))
            }
            FaultKind::NetworkPartition => {
                tokio::time::sleep(duration).await;
                Ok(Some(SimulatedFault::Partitioned {
                    target: target.to_string(),
                }))
            }
            FaultKind::PacketLoss => {
                let sent = *params.operations.get_or_insert(DEFAULT_OPERATIONS);
                let p = *params.probability.get_or_insert(0.1);
                let dropped = self.roll(|rng| (0..sent).filter(|_| rng.gen_bool(p)).count() as u32);
                sleep_within(Duration::from_millis(u64::from(sent)), duration).await;
                Ok((dropped > 0).then_some(SimulatedFault::PacketsDropped { dropped, sent }))
            }
            FaultKind::ConnectionReset => {
                let fraction = self.roll(|rng| rng.gen_range(0.1..0.9));
                tokio::time::sleep(duration.mul_f64(fraction)).await;
                Ok(Some(SimulatedFault::ConnectionReset))
            }
            FaultKind::BandwidthThrottle => {
                let rate = (*params.rate_kbit.get_or_insert(DEFAULT_RATE_KBIT)).max(1);
                let kbits = u64::from(*params.operations.get_or_insert(DEFAULT_OPERATIONS)) * 8;
                let transfer = Duration::from_secs_f64(kbits as f64 / rate as f64);
                sleep_within(transfer, duration).await;
                Ok(None)
            }
            FaultKind::DnsFailure => {
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::DnsFailure {
                    host: target.to_string(),
                }))
            }
            FaultKind::MemoryExhaustion => {
                let mb = *params.memory_mb.get_or_insert(DEFAULT_MEMORY_MB);
                self.exhaust_memory(mb, duration).await?;
                Ok(None)
            }
            FaultKind::CpuSpike => {
                spin_cpu(duration).await?;
                Ok(None)
            }
            FaultKind::DiskFull => {
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::DiskFull))
            }
            FaultKind::FdExhaustion => {
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::FdLimit))
            }
            FaultKind::ServiceUnavailable => {
                let p = *params.probability.get_or_insert(DEFAULT_PROBABILITY);
                let fires = self.roll(|rng| rng.gen_bool(p));
                yield_briefly(duration).await;
                Ok(fires.then_some(SimulatedFault::ServiceUnavailable))
            }
            FaultKind::DependencyFailure => {
                let name = self.roll(|rng| DEPENDENCIES.choose(rng).copied().unwrap_or("database"));
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::DependencyFailed {
                    name: name.to_string(),
                }))
            }
            FaultKind::RateLimited => {
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::RateLimited))
            }
            FaultKind::DataCorruption => {
                let p = *params.probability.get_or_insert(0.3);
                let offset = self.roll(|rng| rng.gen_bool(p).then(|| rng.gen_range(0..4096usize)));
                yield_briefly(duration).await;
                Ok(offset.map(|offset| SimulatedFault::DataCorrupted { offset }))
            }
            FaultKind::PartialWrite => {
                let requested = *params.operations.get_or_insert(4096) as usize;
                let written = self.roll(|rng| rng.gen_range(0..requested.max(1)));
                yield_briefly(duration).await;
                Ok(Some(SimulatedFault::PartialWrite { written, requested }))
            }
            FaultKind::ClockSkew => {
                let skew_ms = self.roll(|rng| {
                    let magnitude = rng.gen_range(1..=5_000i64);
                    if rng.gen_bool(0.5) {
                        magnitude
                    } else {
                        -magnitude
                    }
                });
                let jitter = self.roll(|rng| rng.gen_range(1..50));
                sleep_within(Duration::from_millis(jitter), duration).await;
                Ok(Some(SimulatedFault::ClockSkew { skew_ms }))
            }
            FaultKind::RaceCondition => {
                let racers = *params.operations.get_or_insert(8);
                self.race(racers, duration).await?;
                Ok(None)
            }
            FaultKind::LockContention => Ok(contend_lock(duration).await),
        }
    }

    async fn exhaust_memory(&self, mb: usize, duration: Duration) -> Result<(), FaultError> {
        if mb > self.memory_cap_mb {
            return Err(FaultError::MemoryCapExceeded {
                requested_mb: mb,
                cap_mb: self.memory_cap_mb,
            });
        }
        // Non-zero fill so every page is actually committed.
        let ballast = vec![1u8; mb * 1024 * 1024];
        black_box(&ballast);
        tokio::time::sleep(duration).await;
        drop(ballast);
        Ok(())
    }

    async fn race(&self, racers: u32, duration: Duration) -> Result<(), FaultError> {
        let delays: Vec<u64> = self.roll(|rng| (0..racers).map(|_| rng.gen_range(0..10)).collect());
        let order = Arc::new(Mutex::new(Vec::with_capacity(delays.len())));
        let handles = delays.into_iter().enumerate().map(|(i, delay)| {
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                sleep_within(Duration::from_millis(delay), duration).await;
                lock(&order).push(i);
            })
        });
        for joined in join_all(handles).await {
            joined?;
        }
        tracing::trace!(order = ?lock(&order), "race finished");
        Ok(())
    }
}

async fn sleep_within(wanted: Duration, bound: Duration) {
    tokio::time::sleep(wanted.min(bound)).await;
}

/// A short suspension for faults that fail fast.
async fn yield_briefly(bound: Duration) {
    sleep_within(Duration::from_millis(5), bound).await;
}

async fn spin_cpu(duration: Duration) -> Result<(), FaultError> {
    let deadline = Instant::now() + duration;
    tokio::task::spawn_blocking(move || {
        let mut x = 0u64;
        while Instant::now() < deadline {
            for i in 0..10_000u64 {
                x = black_box(x.wrapping_mul(31).wrapping_add(i));
            }
        }
        x
    })
    .await?;
    Ok(())
}

async fn contend_lock(duration: Duration) -> Option<SimulatedFault> {
    let lock = Arc::new(tokio::sync::Mutex::new(()));
    let held = Arc::clone(&lock).lock_owned().await;
    let holder = tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        drop(held);
    });
    let acquired = tokio::time::timeout(duration / 2, lock.lock()).await.is_ok();
    holder.abort();
    (!acquired).then_some(SimulatedFault::LockTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn every_fault_kind_completes_within_bound() {
        let injector = FaultInjector::new(1).with_memory_cap_mb(16);
        for kind in FaultKind::ALL {
            let params = FaultParams::new().memory_mb(1);
            let result = injector.inject_fault(*kind, "replay-engine", params, WINDOW).await;
            assert!(result.success, "{kind} failed: {:?}", result.error);
            assert!(result.duration < Duration::from_secs(2), "{kind} overran");
            assert_eq!(result.kind, *kind);
        }
        assert_eq!(injector.history().len(), FaultKind::ALL.len());
    }

    #[tokio::test]
    async fn delay_is_bounded_by_duration() {
        let injector = FaultInjector::new(2);
        let started = Instant::now();
        let result = injector
            .inject_fault(
                FaultKind::NetworkDelay,
                "t",
                FaultParams::new().latency(10_000),
                WINDOW,
            )
            .await;
        assert!(result.success);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(result.params.latency_ms, Some(10_000));
    }

    #[tokio::test]
    async fn timeout_and_partition_inflict_effects() {
        let injector = FaultInjector::new(3);
        let timeout = injector
            .inject_fault(FaultKind::NetworkTimeout, "t", FaultParams::new(), WINDOW)
            .await;
        assert_eq!(timeout.effect, Some(SimulatedFault::Timeout { after_ms: 50 }));

        let partition = injector
            .inject_fault(FaultKind::NetworkPartition, "svc-a", FaultParams::new(), WINDOW)
            .await;
        assert_eq!(
            partition.effect,
            Some(SimulatedFault::Partitioned { target: "svc-a".into() })
        );
    }

    #[tokio::test]
    async fn probability_gates_service_unavailable() {
        let injector = FaultInjector::new(4);
        let always = injector
            .inject_fault(
                FaultKind::ServiceUnavailable,
                "t",
                FaultParams::new().probability(1.0),
                WINDOW,
            )
            .await;
        assert_eq!(always.effect, Some(SimulatedFault::ServiceUnavailable));

        let never = injector
            .inject_fault(
                FaultKind::ServiceUnavailable,
                "t",
                FaultParams::new().probability(0.0),
                WINDOW,
            )
            .await;
        assert_eq!(never.effect, None);
        assert!(never.success);
    }

    #[tokio::test]
    async fn invalid_probability_fails_injection() {
        let injector = FaultInjector::new(5);
        let result = injector
            .inject_fault(
                FaultKind::DataCorruption,
                "t",
                FaultParams::new().probability(1.5),
                WINDOW,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("outside [0, 1]"));
    }

    #[tokio::test]
    async fn memory_fault_respects_cap() {
        let injector = FaultInjector::new(6).with_memory_cap_mb(8);
        let result = injector
            .inject_fault(
                FaultKind::MemoryExhaustion,
                "t",
                FaultParams::new().memory_mb(64),
                WINDOW,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exceeds cap"));

        let small = injector
            .inject_fault(
                FaultKind::MemoryExhaustion,
                "t",
                FaultParams::new().memory_mb(2),
                WINDOW,
            )
            .await;
        assert!(small.success);
    }

    #[tokio::test]
    async fn cpu_spike_occupies_the_window() {
        let injector = FaultInjector::new(7);
        let result = injector
            .inject_fault(FaultKind::CpuSpike, "t", FaultParams::new(), WINDOW)
            .await;
        assert!(result.success);
        assert!(result.duration >= WINDOW);
    }

    #[tokio::test]
    async fn lock_contention_times_out() {
        let injector = FaultInjector::new(8);
        let result = injector
            .inject_fault(FaultKind::LockContention, "t", FaultParams::new(), WINDOW)
            .await;
        assert_eq!(result.effect, Some(SimulatedFault::LockTimeout));
    }

    #[tokio::test]
    async fn sequence_preserves_order() {
        let injector = FaultInjector::new(9);
        let faults = vec![
            (FaultKind::DnsFailure, FaultParams::new()),
            (FaultKind::DiskFull, FaultParams::new()),
            (FaultKind::RateLimited, FaultParams::new()),
        ];
        let results = injector.inject_sequence(&faults, "t", WINDOW).await;
        let kinds: Vec<_> = results.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![FaultKind::DnsFailure, FaultKind::DiskFull, FaultKind::RateLimited]);
    }

    #[tokio::test]
    async fn concurrent_faults_overlap() {
        let injector = FaultInjector::new(10);
        let faults = vec![(FaultKind::NetworkTimeout, FaultParams::new()); 4];
        let started = Instant::now();
        let results = injector
            .inject_concurrent(&faults, "t", Duration::from_millis(100))
            .await;
        assert_eq!(results.len(), 4);
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn random_fault_respects_pool() {
        let injector = FaultInjector::new(11);
        let pool = [FaultKind::DiskFull, FaultKind::FdExhaustion];
        for _ in 0..10 {
            let result = injector.inject_random_fault(&pool, "t", WINDOW).await;
            assert!(pool.contains(&result.kind));
        }
    }

    #[tokio::test]
    async fn stats_and_clear_history() {
        let injector = FaultInjector::new(12);
        injector
            .inject_fault(FaultKind::DiskFull, "t", FaultParams::new(), WINDOW)
            .await;
        injector
            .inject_fault(FaultKind::DiskFull, "t", FaultParams::new(), WINDOW)
            .await;
        injector
            .inject_fault(FaultKind::NetworkDelay, "t", FaultParams::new().latency(1), WINDOW)
            .await;

        let stats = injector.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.with_effect, 2);
        assert_eq!(stats.per_kind.get(&FaultKind::DiskFull), Some(&2));

        injector.clear_history();
        assert!(injector.history().is_empty());
        assert_eq!(injector.stats(), FaultStats::default());
    }
}
