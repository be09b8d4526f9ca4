//! Resilience scenarios, one module per concern.
//!
//! - `generators` - every mutation, span malformation and gork category changes real span data
//! - `engine` - end-to-end runs against healthy, failing, validating and recovering targets
//! - `faults` - injector history and chaos monkey lifecycle
//! - `config` - production ceiling, CI limits, scenario conflicts, overrides
//! - `lightweight` - budgeted runs, exclusions and impossible budgets

pub mod config;
pub mod engine;
pub mod faults;
pub mod generators;
pub mod lightweight;
