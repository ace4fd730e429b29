//! Summary report formatting

use dots_core::CounterSnapshot;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Periodic,
    Final,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Periodic => write!(f, "Periodic"),
            ReportKind::Final => write!(f, "Final"),
        }
    }
}

/// One summary, captured at a point in time
#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub kind: ReportKind,
    pub case: String,
    pub elapsed: Duration,
    pub active_workers: usize,
    pub counters: CounterSnapshot,
    /// Rendered performance aggregate; empty before the first sample
    pub perf: String,
}

impl SummaryReport {
    /// Successful API calls per second since the run started
    pub fn throughput(&self) -> f64 {
        rate(self.counters.total_calls(), self.elapsed)
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    count as f64 / secs
}

/// `HH:MM:SS`, hours unbounded
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== {} summary for {} =====", self.kind, self.case)?;
        writeln!(f, "Elapsed time:   {}", format_elapsed(self.elapsed))?;
        writeln!(f, "Active workers: {}", self.active_workers)?;
        writeln!(f, "{:<12}{:>14}{:>14}", "API call", "Total", "Per second")?;

        let c = &self.counters;
        for (label, count) in [
            ("query", c.queries),
            ("insert", c.inserts),
            ("update", c.updates),
            ("delete", c.deletes),
        ] {
            writeln!(f, "{:<12}{:>14}{:>14.2}", label, count, rate(count, self.elapsed))?;
        }
        writeln!(f, "{:<12}{:>14}", "failed", c.failures)?;
        write!(f, "Throughput:     {:.2} calls/s", self.throughput())?;

        if !self.perf.is_empty() {
            write!(f, "\n{}", self.perf.trim_end())?;
        }
        Ok(())
    }
}
