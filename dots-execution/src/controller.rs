//! The load controller
//!
//! One loop decides whether to open another connection and start a worker
//! or to wait and watch CPU usage. It sleeps in ticks, checking termination
//! and the run deadline on every tick, and returns once termination has been
//! requested. Draining the pool is left to the caller.

use dots_config::{ConcurrencyMode, RunConfig};
use dots_core::{SharedCounters, TerminationCause, TerminationFlag, Wake, TICK};
use dots_logging::RunJournal;
use dots_resilience::SpawnBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::connection::ConnectionFactory;
use crate::pool::WorkerPool;

/// Controller phases, in the order a run passes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No worker started yet; otherwise the same as `SteadySpawn`
    Warmup,
    SteadySpawn,
    Throttled,
    Draining,
    Stopped,
}

/// Tick lengths and counts driving the controller and the drain that follows it
#[derive(Debug, Clone, Copy)]
pub struct ControllerTiming {
    pub tick: Duration,
    /// Ticks slept per throttled block
    pub throttle_ticks: u32,
    /// A heartbeat is journaled every this many ticks
    pub heartbeat_ticks: u32,
    pub drain_poll: Duration,
    pub drain_polls: u32,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            tick: TICK,
            throttle_ticks: 60,
            heartbeat_ticks: 12,
            drain_poll: Duration::from_secs(1),
            drain_polls: 60,
        }
    }
}

/// Whether another worker should be started
#[derive(Debug, Clone)]
pub struct SpawnPolicy {
    mode: ConcurrencyMode,
    target: u32,
    lowered: bool,
}

/// Points the CPU target drops by the first time it is reached
const HYSTERESIS_POINTS: u32 = 10;

impl SpawnPolicy {
    pub fn new(mode: ConcurrencyMode) -> Self {
        let target = match mode {
            ConcurrencyMode::TargetCpuPercent { percent } => percent,
            ConcurrencyMode::FixedConnections { .. } => 0,
        };
        Self {
            mode,
            target,
            lowered: false,
        }
    }

    pub fn should_spawn(&self, active: usize, average_cpu: u32) -> bool {
        match self.mode {
            ConcurrencyMode::FixedConnections { connections } => active < connections as usize,
            ConcurrencyMode::TargetCpuPercent { .. } => average_cpu < self.target,
        }
    }

    /// Called when the spawn condition does not hold. The first call under a
    /// CPU target lowers the target for the rest of the run and returns it.
    pub fn on_throttle(&mut self) -> Option<u32> {
        match self.mode {
            ConcurrencyMode::TargetCpuPercent { .. } if !self.lowered => {
                self.lowered = true;
                self.target = self.target.saturating_sub(HYSTERESIS_POINTS);
                Some(self.target)
            }
            _ => None,
        }
    }

    /// Current CPU target, if running under one
    pub fn target(&self) -> Option<u32> {
        match self.mode {
            ConcurrencyMode::TargetCpuPercent { .. } => Some(self.target),
            ConcurrencyMode::FixedConnections { .. } => None,
        }
    }
}

/// What the spawn loop did before it stopped
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerReport {
    pub cause: TerminationCause,
    pub attempts: u64,
    pub failed_attempts: u64,
    pub spawned: u64,
    /// CPU target in force when the loop stopped
    pub cpu_target: Option<u32>,
}

pub struct LoadController {
    factory: Arc<dyn ConnectionFactory>,
    pool: Arc<WorkerPool>,
    counters: Arc<SharedCounters>,
    termination: TerminationFlag,
    journal: RunJournal,
    duration: Duration,
    interval_minutes: u32,
    timing: ControllerTiming,
    policy: SpawnPolicy,
    backoff: SpawnBackoff,
    state: ControllerState,
    average_cpu: u32,
    attempts: u64,
    failed_attempts: u64,
}

impl LoadController {
    pub fn new(
        run: &RunConfig,
        factory: Arc<dyn ConnectionFactory>,
        pool: Arc<WorkerPool>,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
        journal: RunJournal,
    ) -> Self {
        Self {
            factory,
            pool,
            counters,
            termination,
            journal,
            duration: run.duration,
            interval_minutes: run.creation_interval_minutes,
            timing: ControllerTiming::default(),
            policy: SpawnPolicy::new(run.load),
            backoff: SpawnBackoff::from_interval_minutes(run.creation_interval_minutes),
            state: ControllerState::Warmup,
            average_cpu: 0,
            attempts: 0,
            failed_attempts: 0,
        }
    }

    pub fn with_timing(mut self, timing: ControllerTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn enter(&mut self, state: ControllerState) {
        if self.state != state {
            debug!("Load controller {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Run the spawn loop until termination is requested or the run duration
    /// elapses, in which case termination is requested here.
    pub async fn run(mut self) -> ControllerReport {
        let deadline = Instant::now() + self.duration;
        self.average_cpu = self.counters.cpu_usage();
        info!(
            "Load controller started: {:?}, spawn interval {} min",
            self.policy.mode, self.interval_minutes
        );

        loop {
            if self.termination.is_requested() {
                break;
            }
            if Instant::now() >= deadline {
                self.termination.request(TerminationCause::Deadline);
                break;
            }

            if self.policy.should_spawn(self.pool.active_count(), self.average_cpu) {
                if self.pool.spawned_total() > 0 {
                    self.enter(ControllerState::SteadySpawn);
                }
                self.try_spawn().await;

                let units = self.backoff.units();
                self.observe(units, deadline).await;
                self.journal.message(&format!(
                    "{} minute average CPU usage = {}%",
                    units / dots_resilience::UNITS_PER_MINUTE,
                    self.average_cpu
                ));
            } else {
                self.enter(ControllerState::Throttled);
                if let Some(target) = self.policy.on_throttle() {
                    self.journal.message(&format!(
                        "CPU usage {}% reached the target, spawning resumes below {}%",
                        self.average_cpu, target
                    ));
                }
                self.observe(self.timing.throttle_ticks, deadline).await;
            }
        }

        self.enter(ControllerState::Draining);
        ControllerReport {
            cause: self.termination.cause().unwrap_or(TerminationCause::Deadline),
            attempts: self.attempts,
            failed_attempts: self.failed_attempts,
            spawned: self.pool.spawned_total(),
            cpu_target: self.policy.target(),
        }
    }

    /// Ask the factory for one connection and start a worker on it
    async fn try_spawn(&mut self) {
        self.attempts += 1;
        match self.factory.create_connection().await {
            Ok(conn) => {
                let id = self.pool.spawn(conn);
                self.backoff.on_success();
                if self.state == ControllerState::Warmup {
                    self.enter(ControllerState::SteadySpawn);
                }
                debug!("Started worker {}, {} active", id, self.pool.active_count());
            }
            Err(e) => {
                self.failed_attempts += 1;
                let units = self.backoff.on_failure();
                self.journal.error(&format!(
                    "Cannot get a connection, next attempt in {}s: {}",
                    (self.timing.tick * units).as_secs(),
                    e
                ));
            }
        }
    }

    /// Sleep `units` ticks, averaging the CPU usage seen at each tick.
    ///
    /// Stops early on termination or at the deadline; the average covers
    /// only the ticks actually observed.
    async fn observe(&mut self, units: u32, deadline: Instant) {
        let mut sum = 0u64;
        let mut observed = 0u64;
        let heartbeat = self.timing.heartbeat_ticks.max(1);

        for j in 0..units {
            sum += u64::from(self.counters.cpu_usage());
            observed += 1;

            if let Wake::Terminated(_) = self.termination.sleep(self.timing.tick).await {
                break;
            }
            if j % heartbeat == 0 {
                self.journal.message(&format!(
                    "Active workers = {}, CPU usage = {}%",
                    self.pool.active_count(),
                    self.counters.cpu_usage()
                ));
            }
            if Instant::now() >= deadline {
                self.termination.request(TerminationCause::Deadline);
                break;
            }
        }

        if observed > 0 {
            self.average_cpu = (sum / observed) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PingWorkload, ScriptedConnection, ScriptedFactory};
    use dots_logging::{BufferedSink, LogChannel};

    struct Harness {
        factory: Arc<ScriptedFactory>,
        counters: Arc<SharedCounters>,
        termination: TerminationFlag,
        sink: Arc<BufferedSink>,
        controller: LoadController,
    }

    fn harness(load: ConcurrencyMode, duration: Duration, script: Vec<bool>) -> Harness {
        let run = RunConfig {
            duration,
            load,
            ..Default::default()
        };
        let conn = ScriptedConnection::new().with_latency(Duration::from_millis(500));
        let factory = Arc::new(ScriptedFactory::new(conn).with_script(script));
        let counters = Arc::new(SharedCounters::new());
        let termination = TerminationFlag::new();
        let sink = Arc::new(BufferedSink::new());
        let journal = RunJournal::new(sink.clone(), termination.clone());
        let pool = Arc::new(WorkerPool::new(
            Arc::new(PingWorkload),
            counters.clone(),
            termination.clone(),
            journal.clone(),
            1000,
        ));
        let controller = LoadController::new(
            &run,
            factory.clone(),
            pool,
            counters.clone(),
            termination.clone(),
            journal,
        );
        Harness {
            factory,
            counters,
            termination,
            sink,
            controller,
        }
    }

    #[test]
    fn test_fixed_connections_policy() {
        let mut policy = SpawnPolicy::new(ConcurrencyMode::FixedConnections { connections: 3 });
        assert!(policy.should_spawn(2, 100));
        assert!(!policy.should_spawn(3, 0));
        assert_eq!(policy.on_throttle(), None);
        assert_eq!(policy.target(), None);
    }

    #[test]
    fn test_cpu_target_lowers_once() {
        let mut policy = SpawnPolicy::new(ConcurrencyMode::TargetCpuPercent { percent: 60 });
        assert!(policy.should_spawn(100, 59));
        assert!(!policy.should_spawn(0, 60));

        assert_eq!(policy.on_throttle(), Some(50));
        assert_eq!(policy.on_throttle(), None);
        assert_eq!(policy.target(), Some(50));

        assert!(!policy.should_spawn(0, 55));
        assert!(policy.should_spawn(0, 49));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_connections_until_deadline() {
        let h = harness(
            ConcurrencyMode::FixedConnections { connections: 2 },
            Duration::from_secs(600),
            vec![],
        );

        let report = h.controller.run().await;

        assert_eq!(report.cause, TerminationCause::Deadline);
        assert_eq!(report.attempts, 2);
        assert_eq!(report.spawned, 2);
        assert_eq!(h.factory.attempts(), 2);
        assert_eq!(h.termination.cause(), Some(TerminationCause::Deadline));
        assert!(h.sink.contains(LogChannel::Message, "Active workers = 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquisition_doubles_interval() {
        let h = harness(
            ConcurrencyMode::FixedConnections { connections: 1 },
            Duration::from_secs(3600),
            vec![false, true],
        );
        let factory = h.factory.clone();
        let termination = h.termination.clone();
        let handle = tokio::spawn(h.controller.run());

        // First attempt fails at t=0; the retry waits 24 ticks instead of 12
        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(factory.attempts(), 1);
        assert_eq!(factory.opened(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(factory.attempts(), 2);
        assert_eq!(factory.opened(), 1);

        termination.request(TerminationCause::Operator);
        let report = handle.await.unwrap();
        assert_eq!(report.cause, TerminationCause::Operator);
        assert_eq!(report.failed_attempts, 1);
        assert!(h.sink.contains(LogChannel::Error, "next attempt in 120s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_target_throttles_without_spawning() {
        let h = harness(
            ConcurrencyMode::TargetCpuPercent { percent: 90 },
            Duration::from_secs(120),
            vec![],
        );
        h.counters.set_cpu_usage(95);

        let report = h.controller.run().await;

        assert_eq!(report.attempts, 0);
        assert_eq!(report.cpu_target, Some(80));
        assert_eq!(report.cause, TerminationCause::Deadline);
        assert!(h.sink.contains(LogChannel::Message, "spawning resumes below 80%"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_termination_observed_within_a_tick() {
        let h = harness(
            ConcurrencyMode::FixedConnections { connections: 5 },
            Duration::from_secs(3600),
            vec![],
        );
        let termination = h.termination.clone();
        let handle = tokio::spawn(h.controller.run());

        tokio::time::sleep(Duration::from_secs(32)).await;
        termination.request(TerminationCause::Signal);

        let report = tokio::time::timeout(TICK, handle).await.unwrap().unwrap();
        assert_eq!(report.cause, TerminationCause::Signal);
        assert_eq!(report.spawned, 1);
    }
}
