//! Interval and all-time statistics over performance samples

use crate::protocol::{MetricLayout, PerfSample};
use std::fmt::Write;

/// Window count metrics cover this many seconds
const SAMPLE_WINDOW_SECS: u64 = 5;

/// Peak and running sum for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricStats {
    pub interval_peak: u64,
    pub interval_sum: u64,
    pub all_time_peak: u64,
    pub all_time_sum: u64,
}

impl MetricStats {
    fn record(&mut self, value: u64) {
        self.interval_peak = self.interval_peak.max(value);
        self.interval_sum = self.interval_sum.saturating_add(value);
        self.all_time_peak = self.all_time_peak.max(value);
        self.all_time_sum = self.all_time_sum.saturating_add(value);
    }

    fn reset_interval(&mut self) {
        self.interval_peak = 0;
        self.interval_sum = 0;
    }
}

/// Aggregates for every metric of a layout
///
/// Sample counts are shared: every STATE reply counts once, whatever number
/// of fields it carried, so `sum / count` is the running average per reply.
#[derive(Debug, Clone)]
pub struct PerfAggregate {
    layout: MetricLayout,
    metrics: Vec<MetricStats>,
    interval_samples: u64,
    all_time_samples: u64,
}

impl PerfAggregate {
    pub fn new(layout: MetricLayout) -> Self {
        Self {
            layout,
            metrics: vec![MetricStats::default(); layout.metric_count()],
            interval_samples: 0,
            all_time_samples: 0,
        }
    }

    pub fn layout(&self) -> &MetricLayout {
        &self.layout
    }

    pub fn record(&mut self, sample: &PerfSample) {
        for (stats, value) in self.metrics.iter_mut().zip(sample.values()) {
            stats.record(*value);
        }
        self.interval_samples += 1;
        self.all_time_samples += 1;
    }

    pub fn reset_interval(&mut self) {
        for stats in &mut self.metrics {
            stats.reset_interval();
        }
        self.interval_samples = 0;
    }

    pub fn metric(&self, index: usize) -> Option<&MetricStats> {
        self.metrics.get(index)
    }

    pub fn interval_samples(&self) -> u64 {
        self.interval_samples
    }

    pub fn all_time_samples(&self) -> u64 {
        self.all_time_samples
    }

    /// Render peak and average columns for every metric
    ///
    /// Empty until the first sample arrives. Window counts (disk, paging)
    /// are shown per second.
    pub fn render_summary(&self) -> String {
        if self.all_time_samples == 0 {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<20}{:>16}{:>16}{:>16}{:>16}",
            "Metric", "Interval Peak", "Interval Avg", "All-time Peak", "All-time Avg"
        );

        for (index, stats) in self.metrics.iter().enumerate() {
            let scale = if self.layout.is_window_count(index) {
                SAMPLE_WINDOW_SECS
            } else {
                1
            };

            let interval_avg = average(stats.interval_sum, self.interval_samples);
            let all_time_avg = average(stats.all_time_sum, self.all_time_samples);

            let _ = writeln!(
                out,
                "{:<20}{:>16}{:>16}{:>16}{:>16}",
                self.layout.label(index),
                stats.interval_peak / scale,
                interval_avg / scale,
                stats.all_time_peak / scale,
                all_time_avg / scale,
            );
        }

        out
    }
}

fn average(sum: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        sum / count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_core() -> PerfAggregate {
        PerfAggregate::new(MetricLayout::new(2))
    }

    fn sample(line: &str) -> PerfSample {
        PerfSample::parse(line, &MetricLayout::new(2)).unwrap()
    }

    #[test]
    fn test_single_state_updates_each_metric() {
        let mut agg = two_core();
        agg.record(&sample("42;10;20;30;5;0;1;2"));

        let cpu = agg.metric(0).unwrap();
        assert_eq!(cpu.interval_peak, 42);
        assert_eq!(cpu.all_time_sum, 42);
        assert_eq!(agg.metric(1).unwrap().interval_peak, 10);
        assert_eq!(agg.metric(2).unwrap().interval_peak, 20);
        assert_eq!(agg.metric(3).unwrap().all_time_peak, 30);
        assert_eq!(agg.metric(4).unwrap().all_time_peak, 5);

        // Zero reading: peak stays at zero, sum unchanged, sample still counted
        let page_in = agg.metric(5).unwrap();
        assert_eq!(page_in.all_time_peak, 0);
        assert_eq!(page_in.all_time_sum, 0);
        assert_eq!(agg.metric(6).unwrap().all_time_peak, 1);
        assert_eq!(agg.all_time_samples(), 1);
    }

    #[test]
    fn test_sample_count_is_shared_across_metrics() {
        let mut agg = two_core();
        agg.record(&sample("40;10;20;30;5;5;5"));
        agg.record(&sample("60;30"));

        assert_eq!(agg.all_time_samples(), 2);
        assert_eq!(agg.metric(0).unwrap().all_time_sum, 100);
        assert_eq!(agg.metric(1).unwrap().all_time_sum, 40);
        // Short record: memory only got the first reading but still averages over 2
        assert_eq!(agg.metric(3).unwrap().all_time_sum, 30);
    }

    #[test]
    fn test_all_time_sum_matches_received_values() {
        let mut agg = two_core();
        let readings = [13u64, 87, 0, 55, 99, 1];
        for value in readings {
            agg.record(&sample(&format!("{};0;0;0;0;0;0", value)));
        }
        assert_eq!(agg.metric(0).unwrap().all_time_sum, readings.iter().sum::<u64>());
        assert_eq!(agg.metric(0).unwrap().all_time_peak, 99);
        assert_eq!(agg.all_time_samples(), readings.len() as u64);
    }

    #[test]
    fn test_reset_interval_keeps_all_time() {
        let mut agg = two_core();
        agg.record(&sample("42;10;20;30;5;0;1"));
        agg.reset_interval();

        for index in 0..7 {
            let stats = agg.metric(index).unwrap();
            assert_eq!(stats.interval_peak, 0);
            assert_eq!(stats.interval_sum, 0);
        }
        assert_eq!(agg.interval_samples(), 0);
        assert_eq!(agg.all_time_samples(), 1);
        assert_eq!(agg.metric(0).unwrap().all_time_peak, 42);
        assert!(agg.interval_samples() <= agg.all_time_samples());
    }

    #[test]
    fn test_render_empty_before_first_sample() {
        assert_eq!(two_core().render_summary(), "");
    }

    #[test]
    fn test_render_columns() {
        let mut agg = two_core();
        agg.record(&sample("40;10;20;1000;50;10;5"));
        agg.record(&sample("60;30;40;3000;100;20;15"));

        let rendered = agg.render_summary();
        let cpu = rendered.lines().nth(1).unwrap();
        assert!(cpu.starts_with("CPU average (%)"));
        let columns: Vec<&str> = cpu.split_whitespace().rev().take(4).collect();
        // Reversed: all-time avg, all-time peak, interval avg, interval peak
        assert_eq!(columns, vec!["50", "60", "50", "60"]);

        // Disk I/O is per second: peak 100 / 5, average 75 / 5
        let disk = rendered.lines().find(|l| l.starts_with("Disk I/O")).unwrap();
        let columns: Vec<&str> = disk.split_whitespace().rev().take(4).collect();
        assert_eq!(columns, vec!["15", "20", "15", "20"]);

        // Memory is not scaled
        let memory = rendered.lines().find(|l| l.starts_with("Memory")).unwrap();
        assert!(memory.ends_with("3000            2000"));
    }

    #[test]
    fn test_render_after_reset_shows_zero_interval() {
        let mut agg = two_core();
        agg.record(&sample("40;10;20;1000;50;10;5"));
        agg.reset_interval();

        let rendered = agg.render_summary();
        let cpu = rendered.lines().nth(1).unwrap();
        let columns: Vec<&str> = cpu.split_whitespace().rev().take(4).collect();
        assert_eq!(columns, vec!["40", "40", "0", "0"]);
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut agg = two_core();
        agg.record(&sample("42;10;20;30;5;0;1"));
        assert_eq!(agg.render_summary(), agg.render_summary());
    }
}
