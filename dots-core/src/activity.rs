//! Live worker accounting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of workers that have been started and not yet finished cleanup.
///
/// The count is raised before a worker is scheduled and lowered by its
/// [`ActiveGuard`] when the worker is dropped, so it never undercounts a
/// worker that is still releasing its connection.
#[derive(Debug, Clone, Default)]
pub struct ActiveCounter {
    active: Arc<AtomicUsize>,
}

impl ActiveCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new worker. Keep the guard alive for the worker's lifetime.
    pub fn enter(&self) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            active: self.active.clone(),
        }
    }

    pub fn get(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Decrements the owning [`ActiveCounter`] exactly once, on drop
#[derive(Debug)]
pub struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_lifecycle() {
        let counter = ActiveCounter::new();
        let first = counter.enter();
        let second = counter.enter();
        assert_eq!(counter.get(), 2);

        drop(first);
        assert_eq!(counter.get(), 1);

        drop(second);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_clones_share_count() {
        let counter = ActiveCounter::new();
        let observer = counter.clone();
        let _guard = counter.enter();
        assert_eq!(observer.get(), 1);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let counter = ActiveCounter::new();
        let worker_counter = counter.clone();

        let result = std::thread::spawn(move || {
            let _guard = worker_counter.enter();
            panic!("workload blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(counter.get(), 0);
    }
}
