//! Worker tasks, one per database connection

use dots_core::{ActiveCounter, SharedCounters, TerminationFlag};
use dots_logging::RunJournal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

use crate::connection::Connection;
use crate::generator::DataGenerator;
use crate::workload::{WorkerContext, Workload, WorkloadOutcome};

/// Spawns workers running a single workload and tracks how many are alive
pub struct WorkerPool {
    workload: Arc<dyn Workload>,
    counters: Arc<SharedCounters>,
    termination: TerminationFlag,
    journal: RunJournal,
    max_rows: u64,
    active: ActiveCounter,
    spawned: AtomicU64,
}

impl WorkerPool {
    pub fn new(
        workload: Arc<dyn Workload>,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
        journal: RunJournal,
        max_rows: u64,
    ) -> Self {
        Self {
            workload,
            counters,
            termination,
            journal,
            max_rows,
            active: ActiveCounter::new(),
            spawned: AtomicU64::new(0),
        }
    }

    /// Hand `conn` to a new worker task and return its id.
    ///
    /// The active count is raised before the task is scheduled and lowered
    /// only after the worker has closed its connection.
    pub fn spawn(&self, conn: Box<dyn Connection>) -> u64 {
        let guard = self.active.enter();
        let worker_id = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;

        let workload = self.workload.clone();
        let journal = self.journal.clone();
        let mut ctx = WorkerContext::new(
            worker_id,
            self.counters.clone(),
            self.termination.clone(),
            self.journal.clone(),
            self.max_rows,
            DataGenerator::new(),
        );

        tokio::spawn(
            async move {
                let _guard = guard;
                let mut conn = conn;
                debug!("Worker started");

                match workload.run(conn.as_mut(), &mut ctx).await {
                    WorkloadOutcome::Terminated => debug!("Worker observed termination"),
                    WorkloadOutcome::Aborted(e) => {
                        warn!("Worker aborted: {}", e);
                    }
                }

                if let Err(e) = conn.close().await {
                    journal.error(&format!("Worker {} failed to close its connection: {}", worker_id, e));
                }
            }
            .instrument(info_span!("worker", id = worker_id)),
        );

        worker_id
    }

    pub fn active_count(&self) -> usize {
        self.active.get()
    }

    /// Workers started over the pool's lifetime
    pub fn spawned_total(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Clone of the live-worker counter, for drain waits
    pub fn active_counter(&self) -> ActiveCounter {
        self.active.clone()
    }

    pub fn workload(&self) -> &Arc<dyn Workload> {
        &self.workload
    }
}
