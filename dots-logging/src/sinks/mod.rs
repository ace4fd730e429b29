pub mod buffer;
pub mod file;

pub use buffer::BufferedSink;
pub use file::FileSink;

use crate::LogChannel;
use thiserror::Error;

/// Errors raised by a journal sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// The channel already holds as many bytes as it may
    #[error("{channel} log reached its limit of {limit} bytes")]
    CapacityExceeded { channel: LogChannel, limit: u64 },

    #[error("log write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only destination for journal lines
pub trait LogSink: Send + Sync {
    /// Append one entry (without trailing newline) to a channel.
    ///
    /// A multi-line entry is written whole or refused whole.
    fn append(&self, channel: LogChannel, line: &str) -> Result<(), SinkError>;

    /// Push buffered bytes to the underlying storage
    fn flush(&self) -> Result<(), SinkError>;
}
