//! Logging infrastructure for DOTS
//!
//! Two separate concerns live here:
//! - console diagnostics through `tracing`, set up by [`init_simple_tracing`]
//! - the run journal, three append-only capped channels (message, error,
//!   summary) that form the persistent record of a load run

pub mod channel;
pub mod init;
pub mod journal;
pub mod sinks;

// Re-export main types for convenience
pub use channel::LogChannel;
pub use init::init_simple_tracing;
pub use journal::RunJournal;
pub use sinks::{BufferedSink, FileSink, LogSink, SinkError};
