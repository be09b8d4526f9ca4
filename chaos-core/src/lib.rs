//! # chaos-core
//!
//! Pure corruption generators for replay-chaos (no I/O, instant tests).
//!
//! This crate produces the adversarial inputs a replay target is fed:
//! - [`MutationEngine`] - structural corruption of keyed/nested records
//! - [`SpanMutator`] - trace-span malformations and corrupted traces
//! - [`GorkGenerator`] - garbled byte/text/protocol payloads
//!
//! ## Design Philosophy
//!
//! Every generator is a pure function of its inputs plus a private
//! [`StdRng`](rand::rngs::StdRng) stream. Nothing is shared between
//! instances, so concurrent workers each own one generator and need no
//! locking. Seeding a generator makes its output reproducible.
//!
//! Async fault injection lives in `chaos-inject`; orchestration lives in
//! `chaos-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gork;
pub mod mutation;
pub mod payloads;
pub mod span;

pub use gork::{expected_failures, GorkError, GorkGenerator};
pub use mutation::{MutationEngine, MutationError};
pub use span::{MalformedSpan, MalformedTrace, SpanError, SpanMutator};
