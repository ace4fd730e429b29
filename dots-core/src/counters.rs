//! Process-wide API call counters

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Classification of one database round-trip for counting purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    Query,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCall::Query => write!(f, "query"),
            ApiCall::Insert => write!(f, "insert"),
            ApiCall::Update => write!(f, "update"),
            ApiCall::Delete => write!(f, "delete"),
        }
    }
}

/// Counters shared by every worker, the controller and the summary writer.
///
/// All counters are monotonic; nothing decrements them. They are advisory
/// statistics, so reads are not transactionally consistent across fields.
#[derive(Debug, Default)]
pub struct SharedCounters {
    queries: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    failures: AtomicU64,
    cpu_usage: AtomicU32,
}

impl SharedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful call
    pub fn record(&self, call: ApiCall) {
        self.record_many(call, 1);
    }

    /// Record `count` successful calls at once (statement batches)
    pub fn record_many(&self, call: ApiCall, count: u64) {
        self.slot(call).fetch_add(count, Ordering::Relaxed);
    }

    /// Record one failed database operation
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, call: ApiCall) -> u64 {
        self.slot(call).load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Latest average CPU usage reported by the performance sampler, in percent
    pub fn cpu_usage(&self) -> u32 {
        self.cpu_usage.load(Ordering::Relaxed)
    }

    pub fn set_cpu_usage(&self, percent: u32) {
        self.cpu_usage.store(percent, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            queries: self.get(ApiCall::Query),
            inserts: self.get(ApiCall::Insert),
            updates: self.get(ApiCall::Update),
            deletes: self.get(ApiCall::Delete),
            failures: self.failures(),
        }
    }

    fn slot(&self, call: ApiCall) -> &AtomicU64 {
        match call {
            ApiCall::Query => &self.queries,
            ApiCall::Insert => &self.inserts,
            ApiCall::Update => &self.updates,
            ApiCall::Delete => &self.deletes,
        }
    }
}

/// Point-in-time copy of the API counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub queries: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub failures: u64,
}

impl CounterSnapshot {
    /// Successful API calls of every kind
    pub fn total_calls(&self) -> u64 {
        self.queries + self.inserts + self.updates + self.deletes
    }
}
