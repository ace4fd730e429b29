//! End-to-end runs over an in-memory performance relay and scripted connections

use dots_config::{ConcurrencyMode, DotsConfig};
use dots_core::{TerminationCause, TerminationFlag};
use dots_execution::testing::{PingWorkload, ScriptedConnection, ScriptedFactory};
use dots_execution::{ExecutionError, RunSession};
use dots_logging::{BufferedSink, LogChannel, RunJournal};
use dots_perf::relay::serve_connection;
use dots_perf::{CounterSource, LineTransport, PerfSample};
use dots_resilience::DrainOutcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;

/// Two-core host reporting the same figures on every STATE
struct SteadyHost;

impl CounterSource for SteadyHost {
    fn cores(&self) -> usize {
        2
    }

    fn sample(&mut self) -> PerfSample {
        PerfSample::full(42, &[10, 20], 30, 5, 0, 1)
    }
}

/// Relay that serves until the client hangs up
fn steady_relay() -> LineTransport<DuplexStream> {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let mut host = SteadyHost;
        let _ = serve_connection(LineTransport::new(server), &mut host).await;
    });
    LineTransport::new(client)
}

/// Relay that answers INIT and `states` STATE requests, then drops the connection
fn failing_relay(states: usize) -> LineTransport<DuplexStream> {
    let (client, server) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let mut server = LineTransport::new(server);
        let mut answered = 0;
        while let Ok(request) = server.recv_line().await {
            let reply = if request == "INIT" {
                "TEST/1;2".to_string()
            } else if answered < states {
                answered += 1;
                "50;40;60;100;0;0;0".to_string()
            } else {
                return;
            };
            if server.send_line(&reply).await.is_err() {
                return;
            }
        }
    });
    LineTransport::new(client)
}

struct Run {
    session: RunSession,
    sink: Arc<BufferedSink>,
    termination: TerminationFlag,
    factory: Arc<ScriptedFactory>,
}

fn run_with(config: DotsConfig, sink: BufferedSink, factory: ScriptedFactory) -> Run {
    let termination = TerminationFlag::new();
    let sink = Arc::new(sink);
    let factory = Arc::new(factory);
    let journal = RunJournal::new(sink.clone(), termination.clone());
    let session = RunSession::new(
        config,
        Arc::new(PingWorkload),
        factory.clone(),
        journal,
        termination.clone(),
    );
    Run {
        session,
        sink,
        termination,
        factory,
    }
}

fn config(duration: Duration, connections: u32) -> DotsConfig {
    let mut config = DotsConfig::default();
    config.run.duration = duration;
    config.run.load = ConcurrencyMode::FixedConnections { connections };
    config.run.creation_interval_minutes = 1;
    config.run.summary_interval_minutes = 1;
    config
}

fn slow_connections() -> ScriptedFactory {
    ScriptedFactory::new(ScriptedConnection::new().with_latency(Duration::from_millis(200)))
}

#[tokio::test(start_paused = true)]
async fn test_run_until_deadline() {
    let run = run_with(
        config(Duration::from_secs(150), 2),
        BufferedSink::new(),
        slow_connections(),
    );

    let report = run.session.run(steady_relay()).await.unwrap();

    assert_eq!(report.cause, TerminationCause::Deadline);
    assert_eq!(report.spawned, 2);
    assert!(report.drain.is_drained());
    assert!(report.counters.queries > 0);
    assert_eq!(report.counters.failures, 0);
    assert!(report.elapsed >= Duration::from_secs(150));

    // Every worker closed its connection, plus the startup check
    assert_eq!(run.factory.closed(), 3);

    assert!(report.final_summary.perf.contains("CPU average"));
    assert!(run.sink.contains(LogChannel::Summary, "Periodic summary for ping"));
    assert!(run.sink.contains(LogChannel::Summary, "Final summary for ping"));
    assert!(run.sink.contains(LogChannel::Message, "Dots is terminating: run duration reached"));
    assert!(run.sink.contains(LogChannel::Message, "All workers exited"));
}

#[tokio::test(start_paused = true)]
async fn test_operator_stop_drains_promptly() {
    let run = run_with(
        config(Duration::from_secs(3600), 4),
        BufferedSink::new(),
        slow_connections(),
    );
    let termination = run.termination.clone();
    let handle = tokio::spawn(run.session.run(steady_relay()));

    tokio::time::sleep(Duration::from_secs(90)).await;
    termination.request(TerminationCause::Operator);

    let report = tokio::time::timeout(Duration::from_secs(15), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.cause, TerminationCause::Operator);
    assert_eq!(report.spawned, 2);
    assert!(report.drain.is_drained());
    assert!(run.sink.contains(LogChannel::Message, "stopped by operator"));
}

#[tokio::test(start_paused = true)]
async fn test_lost_perf_source_stops_run() {
    let run = run_with(
        config(Duration::from_secs(3600), 2),
        BufferedSink::new(),
        slow_connections(),
    );

    let report = run.session.run(failing_relay(3)).await.unwrap();

    assert_eq!(report.cause, TerminationCause::PerfSourceLost);
    assert!(run.sink.contains(LogChannel::Error, "Performance source lost"));
    // The last live interval is still in the final report
    assert!(report.final_summary.perf.contains("CPU average"));
    assert!(run.sink.contains(LogChannel::Summary, "Final summary"));
}

#[tokio::test(start_paused = true)]
async fn test_log_exhaustion_stops_run() {
    let run = run_with(
        config(Duration::from_secs(3600), 2),
        BufferedSink::with_capacity_limit(600),
        slow_connections(),
    );

    let report = run.session.run(steady_relay()).await.unwrap();

    assert_eq!(report.cause, TerminationCause::LogExhausted);
    assert!(report.drain.is_drained());
}

#[tokio::test(start_paused = true)]
async fn test_failed_database_check_starts_nothing() {
    let run = run_with(
        config(Duration::from_secs(3600), 2),
        BufferedSink::new(),
        slow_connections().with_script([false]),
    );

    let result = run.session.run(steady_relay()).await;

    assert!(matches!(result, Err(ExecutionError::DatabaseCheck(_))));
    assert_eq!(run.factory.attempts(), 1);
    assert!(run.sink.lines(LogChannel::Summary).is_empty());
    assert!(!run.termination.is_requested());
}

#[tokio::test(start_paused = true)]
async fn test_controller_panic_drains_and_summarizes() {
    // The startup check gets its connection, the controller's first attempt panics
    let run = run_with(
        config(Duration::from_secs(3600), 2),
        BufferedSink::new(),
        slow_connections().panicking_after(1),
    );

    let report = tokio::time::timeout(Duration::from_secs(30), run.session.run(steady_relay()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.cause, TerminationCause::ControllerFault);
    assert_eq!(report.spawned, 0);
    assert_eq!(report.drain, DrainOutcome::Drained);
    assert!(run.sink.contains(LogChannel::Error, "Load controller failed"));
    assert!(run.sink.contains(LogChannel::Summary, "Final summary for ping"));
    assert!(run.sink.contains(LogChannel::Message, "All workers exited"));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_workers_are_abandoned() {
    // Each call outlasts the drain window, so the worker never reaches its next termination check
    let factory = ScriptedFactory::new(ScriptedConnection::new().with_latency(Duration::from_secs(600)));
    let run = run_with(config(Duration::from_secs(3600), 1), BufferedSink::new(), factory);
    let termination = run.termination.clone();
    let handle = tokio::spawn(run.session.run(steady_relay()));

    // Startup check ends at 600s, the worker's first action then runs until 1200s
    tokio::time::sleep(Duration::from_secs(700)).await;
    termination.request(TerminationCause::Operator);

    let report = tokio::time::timeout(Duration::from_secs(120), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.cause, TerminationCause::Operator);
    assert_eq!(report.spawned, 1);
    assert_eq!(report.drain, DrainOutcome::Abandoned { remaining: 1 });
    assert!(run.sink.contains(LogChannel::Error, "1 workers still active after 60s, abandoning them"));
    assert!(run.sink.contains(LogChannel::Summary, "Final summary for ping"));
    assert!(!run.sink.contains(LogChannel::Message, "All workers exited"));
}
