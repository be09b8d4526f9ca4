//! In-process replay targets with realistic failure behaviour.
//!
//! [`MockTarget`](chaos_engine::MockTarget) covers scripted failures. The
//! targets here behave like a real consumer: one validates records, one
//! recovers after an outage.

use async_trait::async_trait;
use chaos_engine::{ReplayTarget, TargetError};
use chaos_types::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Largest string field a [`ValidatingTarget`] accepts.
pub const MAX_FIELD_BYTES: usize = 64 * 1024;

/// Rejects anything a strict span consumer would: raw bytes, missing or
/// malformed identifiers, non-finite numbers, oversized strings, non-UTF-8.
#[derive(Debug, Default)]
pub struct ValidatingTarget {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl ValidatingTarget {
    /// New target with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records accepted.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Records rejected.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Check one record.
    pub fn validate(record: &Value) -> Result<(), String> {
        let Value::Map(fields) = record else {
            return Err(format!("expected a map, got {}", record.type_name()));
        };
        for id in ["trace_id", "span_id"] {
            match fields.get(id) {
                Some(Value::Str(s)) if is_hex_id(s) => {}
                Some(other) => return Err(format!("{id} is malformed: {other:?}")),
                None => return Err(format!("{id} is missing")),
            }
        }
        check_value(record, 0)
    }
}

fn is_hex_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn check_value(value: &Value, depth: usize) -> Result<(), String> {
    if depth > 32 {
        return Err("nesting too deep".into());
    }
    match value {
        Value::Float(f) if !f.is_finite() => Err(format!("non-finite number {f}")),
        Value::Str(s) if s.len() > MAX_FIELD_BYTES => Err(format!("{} byte string", s.len())),
        Value::Bytes(_) => Err("raw bytes in record".into()),
        Value::Opaque(kind) => Err(format!("unserializable {kind}")),
        Value::List(items) => items.iter().try_for_each(|v| check_value(v, depth + 1)),
        Value::Map(fields) => fields.values().try_for_each(|v| check_value(v, depth + 1)),
        _ => Ok(()),
    }
}

#[async_trait]
impl ReplayTarget for ValidatingTarget {
    async fn process(&self, record: &Value) -> Result<(), TargetError> {
        match Self::validate(record) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(TargetError::Rejected(reason))
            }
        }
    }
}

/// Unavailable for the first `outage` calls, healthy afterwards.
#[derive(Debug)]
pub struct RecoveringTarget {
    outage: u64,
    latency: Duration,
    calls: AtomicU64,
}

impl RecoveringTarget {
    /// Fail the first `outage` calls, each after `latency`.
    pub fn new(outage: u64, latency: Duration) -> Self {
        Self {
            outage,
            latency,
            calls: AtomicU64::new(0),
        }
    }

    /// Total calls.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReplayTarget for RecoveringTarget {
    async fn process(&self, _record: &Value) -> Result<(), TargetError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if call < self.outage {
            tokio::time::sleep(self.latency).await;
            return Err(TargetError::Unavailable(format!("outage call {}", call + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_core::SpanMutator;

    #[test]
    fn valid_spans_pass_validation() {
        let mut spans = SpanMutator::new(3);
        for span in spans.valid_trace(4) {
            assert_eq!(ValidatingTarget::validate(&span), Ok(()));
        }
    }

    #[test]
    fn rejects_bad_records() {
        assert!(ValidatingTarget::validate(&Value::Bytes(vec![0xFF])).is_err());
        let mut span = SpanMutator::new(3).base_span();
        if let Value::Map(fields) = &mut span {
            fields.insert("duration".into(), Value::Float(f64::NAN));
        }
        assert!(ValidatingTarget::validate(&span).unwrap_err().contains("non-finite"));
    }

    #[tokio::test]
    async fn recovering_target_recovers() {
        let target = RecoveringTarget::new(2, Duration::ZERO);
        let record = Value::Null;
        assert!(target.process(&record).await.is_err());
        assert!(target.process(&record).await.is_err());
        assert!(target.process(&record).await.is_ok());
        assert_eq!(target.calls(), 3);
    }
}
