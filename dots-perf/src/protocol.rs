//! Performance protocol definitions
//!
//! Requests and replies are single newline-terminated ASCII lines.
//! `INIT` is answered with `<version>;<cores>`, `STATE` with
//! `avg;cpu_1;...;cpu_N;memMB;diskIO;pageIn;pageOut`.

use crate::error::PerfError;
use std::fmt;
use std::str::FromStr;

/// Version string sent by this relay in INIT replies
pub const PROTOCOL_VERSION: &str = "DOTS-PERF/1.0";

/// Reply sent by the relay for a request it does not know
pub const UNKNOWN_REQUEST_REPLY: &str = "ERR unknown request";

const FIELD_SEPARATOR: char = ';';

/// Requests understood by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfRequest {
    Init,
    State,
}

impl PerfRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerfRequest::Init => "INIT",
            PerfRequest::State => "STATE",
        }
    }
}

impl fmt::Display for PerfRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerfRequest {
    type Err = PerfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INIT" => Ok(PerfRequest::Init),
            "STATE" => Ok(PerfRequest::State),
            other => Err(PerfError::UnknownRequest(other.to_string())),
        }
    }
}

/// Reply to INIT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReply {
    pub version: String,
    pub cores: usize,
}

impl InitReply {
    pub fn new(cores: usize) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            cores,
        }
    }

    /// Parse `<version>;<cores>`; fields after the core count are ignored
    pub fn parse(line: &str) -> Result<Self, PerfError> {
        let mut fields = line.trim().split(FIELD_SEPARATOR);

        let version = fields
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PerfError::MalformedReply(format!("empty INIT reply: {:?}", line)))?;

        let raw_cores = fields
            .next()
            .map(str::trim)
            .ok_or_else(|| PerfError::MalformedReply(format!("INIT reply without core count: {:?}", line)))?;

        let cores: usize = raw_cores
            .parse()
            .map_err(|_| PerfError::InvalidCoreCount(raw_cores.to_string()))?;
        if cores == 0 {
            return Err(PerfError::InvalidCoreCount(raw_cores.to_string()));
        }

        Ok(Self {
            version: version.to_string(),
            cores,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.version, FIELD_SEPARATOR, self.cores)
    }
}

/// Position and naming of metrics in a STATE record for a given core count
///
/// Index 0 is the average over all cores, 1..=N the individual cores,
/// followed by memory, disk I/O, page-in and page-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricLayout {
    cores: usize,
}

impl MetricLayout {
    pub fn new(cores: usize) -> Self {
        Self { cores }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn metric_count(&self) -> usize {
        self.cores + 5
    }

    pub fn memory_index(&self) -> usize {
        self.cores + 1
    }

    /// Disk I/O, page-in and page-out are counts over one sampling window
    pub fn is_window_count(&self, index: usize) -> bool {
        index > self.memory_index() && index < self.metric_count()
    }

    pub fn label(&self, index: usize) -> String {
        let offset = index.saturating_sub(self.cores);
        match index {
            0 => "CPU average (%)".to_string(),
            i if i <= self.cores => format!("CPU {} (%)", i),
            _ => match offset {
                1 => "Memory used (MB)".to_string(),
                2 => "Disk I/O (ops/s)".to_string(),
                3 => "Page in (/s)".to_string(),
                4 => "Page out (/s)".to_string(),
                _ => format!("metric {}", index),
            },
        }
    }
}

/// One parsed STATE record
///
/// Holds the fields that were present, in layout order. A short record
/// means the missing trailing metrics get no update this time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfSample {
    values: Vec<u64>,
}

impl PerfSample {
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    /// A complete record
    pub fn full(
        cpu_average: u64,
        per_core: &[u64],
        memory_mb: u64,
        disk_io: u64,
        page_in: u64,
        page_out: u64,
    ) -> Self {
        let mut values = Vec::with_capacity(per_core.len() + 5);
        values.push(cpu_average);
        values.extend_from_slice(per_core);
        values.extend_from_slice(&[memory_mb, disk_io, page_in, page_out]);
        Self { values }
    }

    /// Parse a STATE reply; fields beyond the layout are ignored
    pub fn parse(line: &str, layout: &MetricLayout) -> Result<Self, PerfError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Self { values: Vec::new() });
        }

        let mut values = Vec::with_capacity(layout.metric_count());
        for field in trimmed.split(FIELD_SEPARATOR).take(layout.metric_count()) {
            let field = field.trim();
            if field.is_empty() {
                // Trailing separator, or nothing more to report
                break;
            }
            values.push(parse_metric(field).ok_or_else(|| {
                PerfError::MalformedReply(format!("non-numeric field {:?} in {:?}", field, line))
            })?);
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn cpu_average(&self) -> Option<u64> {
        self.values.first().copied()
    }

    pub fn encode(&self) -> String {
        self.values
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Accept integers, and round decimal readings some sources emit
fn parse_metric(field: &str) -> Option<u64> {
    if let Ok(value) = field.parse::<u64>() {
        return Some(value);
    }
    let value = field.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing() {
        assert_eq!("INIT".parse::<PerfRequest>().unwrap(), PerfRequest::Init);
        assert_eq!(" state \r".parse::<PerfRequest>().unwrap(), PerfRequest::State);
        assert!(matches!(
            "HELLO".parse::<PerfRequest>(),
            Err(PerfError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_init_reply() {
        let reply = InitReply::parse("DOTS-PERF/1.0;2").unwrap();
        assert_eq!(reply.version, "DOTS-PERF/1.0");
        assert_eq!(reply.cores, 2);

        // Legacy relays append extra fields
        let reply = InitReply::parse("1.0;8;linux\n").unwrap();
        assert_eq!(reply.cores, 8);

        assert_eq!(InitReply::new(4).encode(), "DOTS-PERF/1.0;4");
    }

    #[test]
    fn test_init_reply_errors() {
        assert!(matches!(InitReply::parse(""), Err(PerfError::MalformedReply(_))));
        assert!(matches!(InitReply::parse("1.0"), Err(PerfError::MalformedReply(_))));
        assert!(matches!(InitReply::parse("1.0;x"), Err(PerfError::InvalidCoreCount(_))));
        assert!(matches!(InitReply::parse("1.0;0"), Err(PerfError::InvalidCoreCount(_))));
    }

    #[test]
    fn test_state_record_in_layout_order() {
        let layout = MetricLayout::new(2);
        let sample = PerfSample::parse("42;10;20;30;5;0;1;2", &layout).unwrap();

        // avg, core 1, core 2, memory, disk, page in, page out; extra field dropped
        assert_eq!(sample.values(), &[42, 10, 20, 30, 5, 0, 1]);
        assert_eq!(sample.cpu_average(), Some(42));
    }

    #[test]
    fn test_short_state_record() {
        let layout = MetricLayout::new(2);
        let sample = PerfSample::parse("42;10;20;", &layout).unwrap();
        assert_eq!(sample.values(), &[42, 10, 20]);

        let empty = PerfSample::parse("", &layout).unwrap();
        assert!(empty.values().is_empty());
        assert_eq!(empty.cpu_average(), None);
    }

    #[test]
    fn test_state_record_rejects_garbage() {
        let layout = MetricLayout::new(1);
        assert!(PerfSample::parse("42;abc;1", &layout).is_err());
        assert!(PerfSample::parse("-3", &layout).is_err());
    }

    #[test]
    fn test_decimal_fields_are_rounded() {
        let layout = MetricLayout::new(1);
        let sample = PerfSample::parse("12.6;7.2", &layout).unwrap();
        assert_eq!(sample.values(), &[13, 7]);
    }

    #[test]
    fn test_full_sample_encoding() {
        let sample = PerfSample::full(50, &[40, 60], 1024, 10, 3, 4);
        assert_eq!(sample.encode(), "50;40;60;1024;10;3;4");
    }

    #[test]
    fn test_layout_labels() {
        let layout = MetricLayout::new(2);
        assert_eq!(layout.metric_count(), 7);
        assert_eq!(layout.label(0), "CPU average (%)");
        assert_eq!(layout.label(2), "CPU 2 (%)");
        assert_eq!(layout.label(3), "Memory used (MB)");
        assert_eq!(layout.label(6), "Page out (/s)");
        assert!(!layout.is_window_count(3));
        assert!(layout.is_window_count(4));
        assert!(layout.is_window_count(6));
        assert!(!layout.is_window_count(7));
    }
}
