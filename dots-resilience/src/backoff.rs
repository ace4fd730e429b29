//! Spawn-interval backoff
//!
//! The interval between two spawn attempts is counted in ticks (units of
//! [`dots_core::TICK`]). A failed connection attempt doubles it up to
//! [`MAX_BACKOFF_UNITS`]; a successful one restores the configured base.

use std::time::Duration;

/// Ticks per minute at the standard 5-second tick
pub const UNITS_PER_MINUTE: u32 = 12;

/// Longest spawn interval, one hour of 5-second ticks
pub const MAX_BACKOFF_UNITS: u32 = 720;

/// Doubling backoff over a base number of ticks
#[derive(Debug, Clone)]
pub struct SpawnBackoff {
    base: u32,
    current: u32,
    max: u32,
}

impl SpawnBackoff {
    /// Create a backoff whose base is `base_units` ticks
    pub fn new(base_units: u32, max_units: u32) -> Self {
        let base = base_units.clamp(1, max_units.max(1));
        Self {
            base,
            current: base,
            max: max_units.max(1),
        }
    }

    /// Base of `minutes * 12` ticks, capped at one hour
    pub fn from_interval_minutes(minutes: u32) -> Self {
        Self::new(minutes.saturating_mul(UNITS_PER_MINUTE), MAX_BACKOFF_UNITS)
    }

    /// Current interval in ticks
    pub fn units(&self) -> u32 {
        self.current
    }

    pub fn base_units(&self) -> u32 {
        self.base
    }

    /// Current interval as wall-clock time for a given tick length
    pub fn window(&self, tick: Duration) -> Duration {
        tick * self.current
    }

    /// A connection was acquired: return to the base interval
    pub fn on_success(&mut self) -> u32 {
        self.current = self.base;
        self.current
    }

    /// Acquisition failed: double the interval, never beyond the cap
    pub fn on_failure(&mut self) -> u32 {
        self.current = self.current.saturating_mul(2).min(self.max);
        log::debug!("Spawn interval backed off to {} ticks", self.current);
        self.current
    }

    pub fn is_capped(&self) -> bool {
        self.current >= self.max
    }
}
