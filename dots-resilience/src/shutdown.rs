//! Shutdown coordination
//!
//! Once termination is requested, the controller waits a bounded time for
//! workers to exit, and releases the summary writer through an [`ExitGate`]
//! after the final summary has been written.

use dots_core::ActiveCounter;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Result of waiting for active workers to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every worker exited within the bound
    Drained,
    /// The bound elapsed with workers still running; they are left behind
    Abandoned { remaining: usize },
}

impl DrainOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self, DrainOutcome::Drained)
    }
}

/// Poll `active` every `poll` until it reaches zero, at most `max_polls` times
pub async fn wait_for_drain(active: &ActiveCounter, poll: Duration, max_polls: u32) -> DrainOutcome {
    let mut polls = 0;

    loop {
        let remaining = active.get();
        if remaining == 0 {
            info!("All active workers exited");
            return DrainOutcome::Drained;
        }

        if polls >= max_polls {
            warn!(
                "{} workers still active after {} polls, proceeding without them",
                remaining, polls
            );
            return DrainOutcome::Abandoned { remaining };
        }

        tokio::time::sleep(poll).await;
        polls += 1;
        info!("Current active worker count is {}", active.get());
    }
}

/// One-shot "may exit" signal
#[derive(Debug, Clone)]
pub struct ExitGate {
    state: Arc<watch::Sender<bool>>,
}

impl ExitGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn open(&self) {
        self.state.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until [`ExitGate::open`] has been called
    pub async fn wait_open(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once open
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for ExitGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_immediately_when_idle() {
        let active = ActiveCounter::new();
        let start = tokio::time::Instant::now();

        let outcome = wait_for_drain(&active, Duration::from_secs(1), 60).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_workers() {
        let active = ActiveCounter::new();
        let guard = active.enter();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            drop(guard);
        });

        let start = tokio::time::Instant::now();
        let outcome = wait_for_drain(&active, Duration::from_secs(1), 60).await;
        assert!(outcome.is_drained());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_after_bound() {
        let active = ActiveCounter::new();
        let _stuck = active.enter();
        let _stuck_too = active.enter();

        let start = tokio::time::Instant::now();
        let outcome = wait_for_drain(&active, Duration::from_secs(1), 60).await;
        assert_eq!(outcome, DrainOutcome::Abandoned { remaining: 2 });
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_exit_gate() {
        let gate = ExitGate::new();
        assert!(!gate.is_open());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_open().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.open();
        waiter.await.unwrap();
        assert!(gate.is_open());

        // Already open: returns at once
        gate.wait_open().await;
    }
}
