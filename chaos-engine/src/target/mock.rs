//! Mock target for testing.
//!
//! Counts calls, captures records and fails on demand.

use super::{ReplayTarget, TargetError};
use async_trait::async_trait;
use chaos_types::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Mock target for testing.
///
/// Clones share state, so a test can keep one handle while the engine
/// drives another.
#[derive(Debug, Default)]
pub struct MockTarget {
    inner: Arc<Mutex<MockTargetInner>>,
}

#[derive(Debug, Default)]
struct MockTargetInner {
    calls: u64,
    failures: u64,
    resets: u64,
    captured: Vec<Value>,
    capture: bool,
    fail_next: Option<String>,
    fail_all: Option<String>,
    fail_every: Option<u64>,
    latency: Option<Duration>,
}

impl MockTarget {
    /// Create a target that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a target that rejects everything.
    pub fn failing(error: &str) -> Self {
        let target = Self::new();
        target.fail_all(error);
        target
    }

    fn lock(&self) -> MutexGuard<'_, MockTargetInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cause the next `process()` to fail with the given error.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Cause every `process()` to fail with the given error.
    pub fn fail_all(&self, error: &str) {
        self.lock().fail_all = Some(error.to_string());
    }

    /// Fail every `n`th call (1-based). Zero disables.
    pub fn fail_every(&self, n: u64) {
        self.lock().fail_every = (n > 0).then_some(n);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Keep a copy of every record received.
    pub fn capture_records(&self) {
        self.lock().capture = true;
    }

    /// Records received so far (only when capturing).
    pub fn captured(&self) -> Vec<Value> {
        self.lock().captured.clone()
    }

    /// Total `process()` calls.
    pub fn call_count(&self) -> u64 {
        self.lock().calls
    }

    /// Calls that returned an error.
    pub fn failure_count(&self) -> u64 {
        self.lock().failures
    }

    /// Times `reset()` was called.
    pub fn reset_count(&self) -> u64 {
        self.lock().resets
    }

    /// Clear all state and failure settings.
    pub fn clear(&self) {
        *self.lock() = MockTargetInner::default();
    }

    fn record_call(&self, record: &Value) -> Result<(), TargetError> {
        let mut inner = self.lock();
        inner.calls += 1;
        if inner.capture {
            inner.captured.push(record.clone());
        }

        let forced = inner
            .fail_next
            .take()
            .or_else(|| inner.fail_all.clone())
            .or_else(|| {
                inner
                    .fail_every
                    .filter(|n| inner.calls % n == 0)
                    .map(|n| format!("scheduled failure (every {n} calls)"))
            });
        match forced {
            Some(error) => {
                inner.failures += 1;
                Err(TargetError::Rejected(error))
            }
            None => Ok(()),
        }
    }
}

impl Clone for MockTarget {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ReplayTarget for MockTarget {
    async fn process(&self, record: &Value) -> Result<(), TargetError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.record_call(record)
    }

    async fn reset(&self) -> Result<(), TargetError> {
        self.lock().resets += 1;
        Ok(())
    }
}
