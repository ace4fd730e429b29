//! Performance protocol error types

use thiserror::Error;

/// Performance protocol error types
#[derive(Debug, Error)]
pub enum PerfError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// A reply that does not follow the protocol
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// INIT reply carried an unusable core count
    #[error("Invalid core count: {0}")]
    InvalidCoreCount(String),

    /// Request the relay does not understand
    #[error("Unknown request: {0}")]
    UnknownRequest(String),
}

impl PerfError {
    /// Check if this error ends the sampling session
    ///
    /// There is no reconnection, so anything that breaks the conversation is
    /// fatal. Only a relay receiving a bad request keeps serving.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PerfError::UnknownRequest(_))
    }
}

impl From<std::io::Error> for PerfError {
    fn from(err: std::io::Error) -> Self {
        PerfError::IoError(err.to_string())
    }
}
