//! # resilience-tests
//!
//! End-to-end resilience scenarios for replay-chaos.
//!
//! This crate drives the whole harness against in-process targets:
//! - Generator laws (every transform changes its input)
//! - Engine runs against healthy, failing and flaky targets
//! - Configuration safety (production ceiling, scenario conflicts)
//! - Lightweight mode under an impossible memory budget

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod targets;

pub mod scenarios;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install a `tracing` subscriber once per test binary, filtered by `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
