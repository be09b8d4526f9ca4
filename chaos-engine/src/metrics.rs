//! Metrics collected during a chaos run.
//!
//! The collector is the only object written by every worker and scenario
//! task at once. Counters are atomics, per-scenario tallies live in a
//! [`DashMap`], and the event list is append-only behind a mutex.

use chaos_types::{ChaosEvent, RunMetrics, ScenarioKind, ScenarioTally};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Thread-safe accumulator for one run.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    records_processed: AtomicU64,
    records_mutated: AtomicU64,
    record_failures: AtomicU64,
    mutation_failures: AtomicU64,
    scenarios_executed: AtomicU64,
    scenario_failures: AtomicU64,
    scenarios_cancelled: AtomicU64,
    target_latency_micros: AtomicU64,
    failed_ops: AtomicU64,
    failed_micros: AtomicU64,
    per_scenario: DashMap<ScenarioKind, ScenarioTally>,
    events: Mutex<Vec<ChaosEvent>>,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one replayed record.
    pub fn record_replay(&self, mutated: bool, success: bool, latency: Duration) {
        self.records_processed.fetch_add(1, Ordering::Relaxed);
        self.target_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if mutated {
            self.records_mutated.fetch_add(1, Ordering::Relaxed);
        }
        if !success {
            self.record_failures.fetch_add(1, Ordering::Relaxed);
            self.record_failed_op(latency);
        }
    }

    /// Record a mutation that failed inside the harness.
    pub fn record_mutation_failure(&self) {
        self.mutation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one scenario execution.
    ///
    /// A cancelled event is kept in the event list but stays out of the
    /// execution, failure and recovery counters.
    pub fn record_event(&self, event: ChaosEvent) {
        if event.cancelled {
            self.scenarios_cancelled.fetch_add(1, Ordering::Relaxed);
            self.push_event(event);
            return;
        }
        self.scenarios_executed.fetch_add(1, Ordering::Relaxed);
        {
            let mut tally = self.per_scenario.entry(event.scenario).or_default();
            tally.executed += 1;
            if !event.success {
                tally.failed += 1;
            }
        }
        if !event.success {
            self.scenario_failures.fetch_add(1, Ordering::Relaxed);
            self.record_failed_op(event.duration);
        }
        self.push_event(event);
    }

    fn push_event(&self, event: ChaosEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn record_failed_op(&self, took: Duration) {
        self.failed_ops.fetch_add(1, Ordering::Relaxed);
        self.failed_micros
            .fetch_add(took.as_micros() as u64, Ordering::Relaxed);
    }

    /// Mean duration of failed operations, zero when nothing failed.
    pub fn recovery_time(&self) -> Duration {
        let failed = self.failed_ops.load(Ordering::Relaxed);
        if failed == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.failed_micros.load(Ordering::Relaxed) / failed)
    }

    /// Records processed so far.
    pub fn records_processed(&self) -> u64 {
        self.records_processed.load(Ordering::Relaxed)
    }

    /// Copy of the counters.
    pub fn snapshot(&self) -> RunMetrics {
        let records_processed = self.records_processed.load(Ordering::Relaxed);
        let latency = self.target_latency_micros.load(Ordering::Relaxed);
        RunMetrics {
            records_processed,
            records_mutated: self.records_mutated.load(Ordering::Relaxed),
            record_failures: self.record_failures.load(Ordering::Relaxed),
            mutation_failures: self.mutation_failures.load(Ordering::Relaxed),
            scenarios_executed: self.scenarios_executed.load(Ordering::Relaxed),
            scenario_failures: self.scenario_failures.load(Ordering::Relaxed),
            scenarios_cancelled: self.scenarios_cancelled.load(Ordering::Relaxed),
            mean_target_latency_ms: if records_processed == 0 {
                0.0
            } else {
                latency as f64 / records_processed as f64 / 1000.0
            },
            per_scenario: self
                .per_scenario
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }

    /// Take the recorded events, leaving the list empty.
    pub fn take_events(&self) -> Vec<ChaosEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
