//! The workload abstraction and the registry of built-in workloads

use async_trait::async_trait;
use dots_core::{SharedCounters, TerminationFlag};
use dots_logging::RunJournal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::{Backend, Connection, Statement};
use crate::error::{DbError, ExecutionError};
use crate::generator::DataGenerator;
use crate::workloads;

/// Everything one worker needs besides its connection
pub struct WorkerContext {
    pub worker_id: u64,
    pub counters: Arc<SharedCounters>,
    pub termination: TerminationFlag,
    pub journal: RunJournal,
    /// Row count above which workloads start deleting
    pub max_rows: u64,
    /// Random tag mixed into generated keys
    pub identity: i64,
    pub generator: DataGenerator,
    /// Set by workloads once their per-worker seeding is done
    pub seeded: bool,
    /// Per-table row counts a workload tracks between actions
    pub tallies: HashMap<&'static str, u64>,
}

impl WorkerContext {
    pub fn new(
        worker_id: u64,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
        journal: RunJournal,
        max_rows: u64,
        mut generator: DataGenerator,
    ) -> Self {
        let identity = generator.identity();
        Self {
            worker_id,
            counters,
            termination,
            journal,
            max_rows,
            identity,
            generator,
            seeded: false,
            tallies: HashMap::new(),
        }
    }
}

/// How a worker's loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadOutcome {
    /// Termination was observed between actions
    Terminated,
    /// The connection became unusable
    Aborted(DbError),
}

/// A database workload, shared by all workers running it
#[async_trait]
pub trait Workload: Send + Sync {
    fn name(&self) -> &'static str;

    /// Case-insensitive alternative names
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn description(&self) -> &'static str;

    /// DDL creating the tables this workload uses; must be idempotent
    fn schema(&self) -> &'static [&'static str];

    /// DDL for one backend, or [`ExecutionError::UnsupportedBackend`] when
    /// the workload cannot run there
    fn schema_for(&self, _backend: Backend) -> Result<Vec<&'static str>, ExecutionError> {
        Ok(self.schema().to_vec())
    }

    /// One unit of work. Returns at the first failed call.
    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError>;

    /// Repeat `action` until termination or a connection-fatal error
    async fn run(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> WorkloadOutcome {
        while !ctx.termination.is_requested() {
            if let Err(e) = self.action(conn, ctx).await {
                ctx.counters.record_failure();
                ctx.journal
                    .error(&format!("{} worker {}: {}", self.name(), ctx.worker_id, e));
                if e.is_connection_fatal() {
                    return WorkloadOutcome::Aborted(e);
                }
            }
            tokio::task::yield_now().await;
        }
        WorkloadOutcome::Terminated
    }
}

/// Create the workload's tables over `conn`
pub async fn prepare_schema(workload: &dyn Workload, conn: &mut dyn Connection) -> Result<(), ExecutionError> {
    for ddl in workload.schema_for(conn.backend())? {
        debug!("Executing DDL: {}", ddl);
        conn.execute(&Statement::new(ddl))
            .await
            .map_err(ExecutionError::Schema)?;
    }
    info!("Schema for workload {} is ready", workload.name());
    Ok(())
}

/// Lookup of workloads by name or alias
#[derive(Clone, Default)]
pub struct WorkloadRegistry {
    workloads: Vec<Arc<dyn Workload>>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in workload
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(workloads::BasicWorkload::plain()));
        registry.register(Arc::new(workloads::BasicWorkload::batched()));
        registry.register(Arc::new(workloads::AuctionWorkload));
        registry.register(Arc::new(workloads::MetadataWorkload::new()));
        registry.register(Arc::new(workloads::ProcedureWorkload::new()));
        registry
    }

    pub fn register(&mut self, workload: Arc<dyn Workload>) {
        self.workloads.push(workload);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Workload>> {
        self.workloads
            .iter()
            .find(|w| {
                w.name().eq_ignore_ascii_case(name)
                    || w.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
            })
            .cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Workload>, ExecutionError> {
        self.get(name)
            .ok_or_else(|| ExecutionError::UnknownWorkload(name.to_string()))
    }

    pub fn list(&self) -> &[Arc<dyn Workload>] {
        &self.workloads
    }
}
