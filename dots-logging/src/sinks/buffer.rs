use super::{LogSink, SinkError};
use crate::LogChannel;
use parking_lot::Mutex;

/// In-memory sink keeping every line per channel
#[derive(Default)]
pub struct BufferedSink {
    lines: Mutex<[Vec<String>; 3]>,
    sizes: Mutex<[u64; 3]>,
    max_size: Option<u64>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap each channel at `max_size` bytes, counted like a file including newlines
    pub fn with_capacity_limit(max_size: u64) -> Self {
        Self {
            max_size: Some(max_size),
            ..Default::default()
        }
    }

    /// Stored lines; multi-line entries are split back into lines
    pub fn lines(&self, channel: LogChannel) -> Vec<String> {
        self.lines.lock()[channel.index()].clone()
    }

    /// True if any line on `channel` contains `needle`
    pub fn contains(&self, channel: LogChannel, needle: &str) -> bool {
        self.lines.lock()[channel.index()]
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl LogSink for BufferedSink {
    fn append(&self, channel: LogChannel, line: &str) -> Result<(), SinkError> {
        let needed = line.len() as u64 + 1;
        {
            let mut sizes = self.sizes.lock();
            let size = &mut sizes[channel.index()];
            if let Some(limit) = self.max_size {
                if *size + needed > limit {
                    return Err(SinkError::CapacityExceeded { channel, limit });
                }
            }
            *size += needed;
        }

        self.lines.lock()[channel.index()].extend(line.lines().map(str::to_string));
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
