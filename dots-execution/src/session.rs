//! One complete run: startup checks, the concurrent loops and the drain

use dots_config::DotsConfig;
use dots_core::{CounterSnapshot, SharedCounters, TerminationCause, TerminationFlag};
use dots_logging::RunJournal;
use dots_output::{format_elapsed, SummaryReport, SummaryWriter};
use dots_perf::{LineTransport, PerfSampler, SamplerExit};
use dots_resilience::{wait_for_drain, DrainOutcome, ExitGate};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::connection::{ConnectionFactory, Statement};
use crate::controller::{ControllerTiming, LoadController};
use crate::error::ExecutionError;
use crate::pool::WorkerPool;
use crate::workload::{prepare_schema, Workload};

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub cause: TerminationCause,
    pub counters: CounterSnapshot,
    pub spawned: u64,
    pub elapsed: Duration,
    pub drain: DrainOutcome,
    pub final_summary: SummaryReport,
}

/// Drives one run of a workload against one database
pub struct RunSession {
    config: DotsConfig,
    workload: Arc<dyn Workload>,
    factory: Arc<dyn ConnectionFactory>,
    journal: RunJournal,
    termination: TerminationFlag,
    counters: Arc<SharedCounters>,
    timing: ControllerTiming,
    sample_interval: Duration,
}

impl RunSession {
    pub fn new(
        config: DotsConfig,
        workload: Arc<dyn Workload>,
        factory: Arc<dyn ConnectionFactory>,
        journal: RunJournal,
        termination: TerminationFlag,
    ) -> Self {
        Self {
            config,
            workload,
            factory,
            journal,
            termination,
            counters: Arc::new(SharedCounters::new()),
            timing: ControllerTiming::default(),
            sample_interval: dots_core::TICK,
        }
    }

    pub fn with_timing(mut self, timing: ControllerTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn counters(&self) -> Arc<SharedCounters> {
        self.counters.clone()
    }

    /// Open one connection, run `SELECT 1`, create the workload's tables and close it
    pub async fn check_database(&self) -> Result<(), ExecutionError> {
        let mut conn = self
            .factory
            .create_connection()
            .await
            .map_err(ExecutionError::DatabaseCheck)?;

        let checked = match conn.query_scalar(&Statement::new("SELECT 1")).await {
            Ok(_) => prepare_schema(self.workload.as_ref(), conn.as_mut()).await,
            Err(e) => Err(ExecutionError::DatabaseCheck(e)),
        };
        let closed = conn.close().await;

        checked?;
        closed.map_err(ExecutionError::DatabaseCheck)?;
        info!("Database check passed");
        Ok(())
    }

    /// Run until termination and drain the workers.
    ///
    /// Errors are returned only for startup failures, before any loop runs.
    pub async fn run<S>(self, perf: LineTransport<S>) -> Result<RunReport, ExecutionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let started = Instant::now();
        let run = &self.config.run;
        self.journal.message(&format!(
            "Starting workload {} for {} with {:?}",
            self.workload.name(),
            format_elapsed(run.duration),
            run.load
        ));

        let sampler = PerfSampler::handshake(perf, self.counters.clone(), self.termination.clone())
            .await?
            .with_interval(self.sample_interval);
        self.journal.message(&format!(
            "Performance source {} reports {} cores",
            sampler.version(),
            sampler.monitor().cores()
        ));
        self.check_database().await?;

        let monitor = sampler.monitor();
        let sampler_journal = self.journal.clone();
        let mut sampler_task = tokio::spawn(async move {
            if let SamplerExit::Failed(e) = sampler.run().await {
                sampler_journal.error(&format!("Performance source lost: {}", e));
            }
        });

        let pool = Arc::new(WorkerPool::new(
            self.workload.clone(),
            self.counters.clone(),
            self.termination.clone(),
            self.journal.clone(),
            self.config.database.max_rows,
        ));
        let active = pool.active_counter();

        let gate = ExitGate::new();
        let summary = Arc::new(
            SummaryWriter::new(
                self.workload.name(),
                self.journal.clone(),
                self.counters.clone(),
                active.clone(),
                monitor,
                self.termination.clone(),
            )
            .with_interval(run.summary_interval())
            .with_exit_gate(gate.clone()),
        );
        let summary_task = tokio::spawn(summary.clone().run());

        let controller = LoadController::new(
            run,
            self.factory.clone(),
            pool.clone(),
            self.counters.clone(),
            self.termination.clone(),
            self.journal.clone(),
        )
        .with_timing(self.timing);

        let cause = match tokio::spawn(controller.run()).await {
            Ok(report) => report.cause,
            Err(e) => {
                self.journal.error(&format!("Load controller failed: {}", e));
                self.termination.request(TerminationCause::ControllerFault);
                self.termination
                    .cause()
                    .unwrap_or(TerminationCause::ControllerFault)
            }
        };

        self.journal.message(&format!("Dots is terminating: {}", cause));
        let final_summary = summary.write_final();
        gate.open();

        self.journal.message("Waiting for active workers to exit");
        let drain = wait_for_drain(&active, self.timing.drain_poll, self.timing.drain_polls).await;
        match drain {
            DrainOutcome::Drained => self.journal.message("All workers exited"),
            DrainOutcome::Abandoned { remaining } => self.journal.error(&format!(
                "{} workers still active after {}s, abandoning them",
                remaining,
                (self.timing.drain_poll * self.timing.drain_polls).as_secs()
            )),
        }

        // The sampler sees termination within one interval unless it is stuck on a read
        if tokio::time::timeout(self.sample_interval * 2, &mut sampler_task)
            .await
            .is_err()
        {
            warn!("Performance sampler did not stop, aborting it");
            sampler_task.abort();
        }
        if let Err(e) = summary_task.await {
            warn!("Summary writer ended abnormally: {}", e);
        }

        self.journal.message(&format!("Dots stopped after {}", format_elapsed(started.elapsed())));
        self.journal.flush();

        Ok(RunReport {
            cause,
            counters: self.counters.snapshot(),
            spawned: pool.spawned_total(),
            elapsed: started.elapsed(),
            drain,
            final_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Backend;
    use crate::error::DbError;
    use crate::testing::{PingWorkload, ScriptedConnection, ScriptedFactory};
    use crate::workloads::ProcedureWorkload;
    use dots_logging::BufferedSink;

    fn new_session(factory: ScriptedFactory) -> (RunSession, Arc<BufferedSink>) {
        let termination = TerminationFlag::new();
        let sink = Arc::new(BufferedSink::new());
        let journal = RunJournal::new(sink.clone(), termination.clone());
        let session = RunSession::new(
            DotsConfig::default(),
            Arc::new(PingWorkload),
            Arc::new(factory),
            journal,
            termination,
        );
        (session, sink)
    }

    #[tokio::test]
    async fn test_check_database_closes_connection() {
        let conn = ScriptedConnection::new();
        let (session, _sink) = new_session(ScriptedFactory::new(conn.clone()));

        session.check_database().await.unwrap();
        assert_eq!(conn.executed(), vec!["SELECT 1".to_string()]);
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_check_database_failures() {
        let (session, _sink) = new_session(ScriptedFactory::new(ScriptedConnection::new()).with_script([false]));
        assert!(matches!(
            session.check_database().await,
            Err(ExecutionError::DatabaseCheck(DbError::Connect(_)))
        ));

        let broken = ScriptedConnection::new().failing_with(DbError::Operation("no such function".to_string()));
        let (session, _sink) = new_session(ScriptedFactory::new(broken.clone()));
        assert!(matches!(
            session.check_database().await,
            Err(ExecutionError::DatabaseCheck(DbError::Operation(_)))
        ));
        assert_eq!(broken.close_count(), 1);
    }

    #[tokio::test]
    async fn test_check_database_refuses_procedures_on_sqlite() {
        let conn = ScriptedConnection::new().with_backend(Backend::Sqlite);
        let termination = TerminationFlag::new();
        let journal = RunJournal::new(Arc::new(BufferedSink::new()), termination.clone());
        let session = RunSession::new(
            DotsConfig::default(),
            Arc::new(ProcedureWorkload::new()),
            Arc::new(ScriptedFactory::new(conn.clone())),
            journal,
            termination,
        );

        let err = session.check_database().await.unwrap_err();
        assert_eq!(err.to_string(), "Workload procedure cannot run on SQLite");
        assert_eq!(conn.executed(), vec!["SELECT 1".to_string()]);
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_run_fails_without_perf_source() {
        let (session, _sink) = new_session(ScriptedFactory::new(ScriptedConnection::new()));
        let (client, server) = tokio::io::duplex(256);
        drop(server);

        let result = session.run(LineTransport::new(client)).await;
        assert!(matches!(result, Err(ExecutionError::PerfSource(_))));
    }
}
