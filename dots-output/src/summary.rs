//! The summary writer loop

use dots_core::{ActiveCounter, SharedCounters, TerminationFlag, Wake};
use dots_logging::RunJournal;
use dots_perf::PerfMonitor;
use dots_resilience::ExitGate;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::report::{ReportKind, SummaryReport};

/// Journals a [`SummaryReport`] every interval until termination
pub struct SummaryWriter {
    case: String,
    journal: RunJournal,
    counters: Arc<SharedCounters>,
    active: ActiveCounter,
    monitor: PerfMonitor,
    termination: TerminationFlag,
    gate: ExitGate,
    interval: Duration,
    started: Instant,
    // Held while a report is captured and journaled
    writing: Mutex<()>,
}

impl SummaryWriter {
    pub fn new(
        case: impl Into<String>,
        journal: RunJournal,
        counters: Arc<SharedCounters>,
        active: ActiveCounter,
        monitor: PerfMonitor,
        termination: TerminationFlag,
    ) -> Self {
        Self {
            case: case.into(),
            journal,
            counters,
            active,
            monitor,
            termination,
            gate: ExitGate::new(),
            interval: Duration::from_secs(600),
            started: Instant::now(),
            writing: Mutex::new(()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Gate the writer waits on after termination before its loop returns
    pub fn with_exit_gate(mut self, gate: ExitGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn exit_gate(&self) -> &ExitGate {
        &self.gate
    }

    fn capture(&self, kind: ReportKind, reset: bool) -> SummaryReport {
        SummaryReport {
            kind,
            case: self.case.clone(),
            elapsed: self.started.elapsed(),
            active_workers: self.active.get(),
            counters: self.counters.snapshot(),
            perf: self.monitor.render_and_reset(reset),
        }
    }

    /// Journal a periodic report. The performance interval is reset only
    /// while the run is live, so the final report still covers the last
    /// interval.
    pub fn flush(&self) -> SummaryReport {
        let _writing = self.writing.lock();
        let report = self.capture(ReportKind::Periodic, !self.termination.is_requested());
        self.journal.summary(&report.to_string());
        report
    }

    /// Journal a closing report. Never resets the performance interval.
    pub fn write_final(&self) -> SummaryReport {
        let _writing = self.writing.lock();
        let report = self.capture(ReportKind::Final, false);
        self.journal.summary(&report.to_string());
        self.journal.flush();
        report
    }

    /// Flush every interval until termination, write one final report,
    /// then wait for the exit gate
    pub async fn run(self: Arc<Self>) {
        while let Wake::Elapsed = self.termination.sleep(self.interval).await {
            self.flush();
        }
        self.write_final();
        debug!("Summary writer waiting for the exit gate");
        self.gate.wait_open().await;
    }
}
