//! Wall-clock helpers and serde adapters for durations.

use serde::Serializer;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch for the given instant (0 if before the epoch).
pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds since the Unix epoch, now.
pub fn unix_millis_now() -> u64 {
    unix_millis(SystemTime::now())
}

/// Serialize a [`Duration`] as fractional milliseconds.
pub fn serialize_duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}
