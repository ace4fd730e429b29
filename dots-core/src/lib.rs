//! Core shared state for DOTS
//!
//! This crate holds the small set of process-wide values every other
//! component touches: API call counters, the live worker count and the
//! monotonic termination flag. Each is cheap to clone and safe to share
//! across tasks.

pub mod activity;
pub mod counters;
pub mod termination;

// Re-export commonly used types at the crate root
pub use activity::{ActiveCounter, ActiveGuard};
pub use counters::{ApiCall, CounterSnapshot, SharedCounters};
pub use termination::{TerminationCause, TerminationFlag, Wake};

/// Length of one scheduling tick. Every polling loop wakes at least this often.
pub const TICK: std::time::Duration = std::time::Duration::from_secs(5);
