//! # chaos-inject
//!
//! Simulated faults for the replay-chaos harness.
//!
//! - [`FaultInjector`] - Bounded, async network/resource/service/data/timing faults
//!   with an inspectable injection history
//! - [`ChaosMonkey`] - Background task that injects random faults on an interval
//!
//! Faults never touch real infrastructure. Network and service faults are sleeps
//! plus a synthetic [`SimulatedFault`](chaos_types::SimulatedFault); memory and
//! CPU faults hold real resources for the fault window only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod injector;
pub mod monkey;

pub use error::FaultError;
pub use injector::{FaultInjector, FaultStats, DEFAULT_MEMORY_CAP_MB};
pub use monkey::{ChaosMonkey, ChaosMonkeyConfig};
