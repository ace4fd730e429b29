//! Resilience patterns for DOTS
//!
//! This crate provides the spawn-interval backoff used when connections
//! cannot be acquired, and the pieces of the shutdown sequence: a bounded
//! wait for workers to drain and a one-shot "may exit" gate.

pub mod backoff;
pub mod shutdown;

// Re-export commonly used types
pub use backoff::{SpawnBackoff, MAX_BACKOFF_UNITS, UNITS_PER_MINUTE};
pub use shutdown::{wait_for_drain, DrainOutcome, ExitGate};
