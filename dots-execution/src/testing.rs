//! Scripted connections and workloads for tests
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for the integration test crate.

use async_trait::async_trait;
use dots_core::{ApiCall, SharedCounters, TerminationFlag};
use dots_logging::{BufferedSink, RunJournal};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{Backend, Connection, ConnectionFactory, Statement};
use crate::error::DbError;
use crate::generator::DataGenerator;
use crate::workload::{WorkerContext, Workload};

/// In-memory connection that records every statement it is given
#[derive(Clone)]
pub struct ScriptedConnection {
    executed: Arc<Mutex<Vec<String>>>,
    failure: Option<DbError>,
    scalar: Option<i64>,
    rows: usize,
    latency: Option<Duration>,
    closed: Arc<AtomicUsize>,
    backend: Backend,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            executed: Arc::new(Mutex::new(Vec::new())),
            failure: None,
            scalar: Some(0),
            rows: 1,
            latency: None,
            closed: Arc::new(AtomicUsize::new(0)),
            backend: Backend::Other,
        }
    }

    /// Database product this connection claims to be
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Every call fails with `error`
    pub fn failing_with(mut self, error: DbError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Value returned by `query_scalar`
    pub fn with_scalar(mut self, value: Option<i64>) -> Self {
        self.scalar = value;
        self
    }

    /// Sleep this long before answering each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    async fn call(&self, sql: &str) -> Result<(), DbError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.executed.lock().push(sql.to_string());
        Ok(())
    }
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        self.call(&statement.sql).await?;
        Ok(1)
    }

    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64, DbError> {
        for statement in statements {
            self.call(&statement.sql).await?;
        }
        Ok(statements.len() as u64)
    }

    async fn query_scalar(&mut self, statement: &Statement) -> Result<Option<i64>, DbError> {
        self.call(&statement.sql).await?;
        Ok(self.scalar)
    }

    async fn query_rows(&mut self, statement: &Statement) -> Result<usize, DbError> {
        self.call(&statement.sql).await?;
        Ok(self.rows)
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out [`ScriptedConnection`]s
///
/// Each attempt pops the next scripted outcome (`true` succeeds); once the
/// script runs out every attempt succeeds.
pub struct ScriptedFactory {
    script: Mutex<VecDeque<bool>>,
    template: ScriptedConnection,
    attempts: AtomicUsize,
    opened: AtomicUsize,
    panic_after: Option<usize>,
}

impl ScriptedFactory {
    pub fn new(template: ScriptedConnection) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            template,
            attempts: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            panic_after: None,
        }
    }

    /// Panic on every attempt after the first `attempts`
    pub fn panicking_after(mut self, attempts: usize) -> Self {
        self.panic_after = Some(attempts);
        self
    }

    pub fn with_script(self, outcomes: impl IntoIterator<Item = bool>) -> Self {
        self.script.lock().extend(outcomes);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far, across every connection handed out
    pub fn closed(&self) -> usize {
        self.template.close_count()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn create_connection(&self) -> Result<Box<dyn Connection>, DbError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_after.is_some_and(|limit| attempt > limit) {
            panic!("scripted factory fault on attempt {}", attempt);
        }
        let succeed = self.script.lock().pop_front().unwrap_or(true);
        if !succeed {
            return Err(DbError::Connect("scripted refusal".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }
}

/// Workload issuing one `SELECT 1` per action
pub struct PingWorkload;

#[async_trait]
impl Workload for PingWorkload {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn description(&self) -> &'static str {
        "One SELECT 1 per action"
    }

    fn schema(&self) -> &'static [&'static str] {
        &[]
    }

    async fn action(&self, conn: &mut dyn Connection, ctx: &mut WorkerContext) -> Result<(), DbError> {
        conn.query_scalar(&Statement::new("SELECT 1")).await?;
        ctx.counters.record(ApiCall::Query);
        Ok(())
    }
}

/// Worker context journaling into a fresh [`BufferedSink`]
pub fn test_context(max_rows: u64) -> (WorkerContext, Arc<BufferedSink>) {
    let termination = TerminationFlag::new();
    let sink = Arc::new(BufferedSink::new());
    let journal = RunJournal::new(sink.clone(), termination.clone());
    let ctx = WorkerContext::new(
        1,
        Arc::new(SharedCounters::new()),
        termination,
        journal,
        max_rows,
        DataGenerator::seeded(11),
    );
    (ctx, sink)
}
