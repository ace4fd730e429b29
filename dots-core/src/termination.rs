//! The run-wide termination flag
//!
//! Termination is a single monotonic signal. Any component may request it;
//! once set it never reverts, and the first cause wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Why the run is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// The configured run duration elapsed
    Deadline,
    /// An operator confirmed a STOP command
    Operator,
    /// The process received an interrupt signal
    Signal,
    /// The performance source connection failed
    PerfSourceLost,
    /// A journal channel reached its size cap
    LogExhausted,
    /// The load controller hit an unexpected error
    ControllerFault,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Deadline => write!(f, "run duration reached"),
            TerminationCause::Operator => write!(f, "stopped by operator"),
            TerminationCause::Signal => write!(f, "interrupted"),
            TerminationCause::PerfSourceLost => write!(f, "performance source lost"),
            TerminationCause::LogExhausted => write!(f, "log file size limit reached"),
            TerminationCause::ControllerFault => write!(f, "load controller fault"),
        }
    }
}

/// Outcome of a termination-aware sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Terminated(TerminationCause),
}

/// Shared, clonable termination flag
#[derive(Debug, Clone)]
pub struct TerminationFlag {
    state: Arc<watch::Sender<Option<TerminationCause>>>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Request termination. Returns true only for the call that flipped the flag.
    pub fn request(&self, cause: TerminationCause) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(cause);
                true
            } else {
                false
            }
        })
    }

    pub fn is_requested(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The cause recorded by the first request, if any
    pub fn cause(&self) -> Option<TerminationCause> {
        *self.state.borrow()
    }

    /// Resolve once termination has been requested
    pub async fn requested(&self) -> TerminationCause {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(cause) = *rx.borrow_and_update() {
                return cause;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as `self`, so this cannot close.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`, waking early if termination is requested
    pub async fn sleep(&self, duration: Duration) -> Wake {
        tokio::select! {
            biased;
            cause = self.requested() => Wake::Terminated(cause),
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
        }
    }
}

impl Default for TerminationFlag {
    fn default() -> Self {
        Self::new()
    }
}
