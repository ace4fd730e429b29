//! The run journal: message, error and summary channels

use crate::sinks::{LogSink, SinkError};
use crate::LogChannel;
use chrono::Local;
use dots_core::{TerminationCause, TerminationFlag};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct JournalInner {
    sink: Arc<dyn LogSink>,
    termination: TerminationFlag,
    exhausted: [AtomicBool; 3],
}

/// Timestamped, capped journal shared by every component of a run
///
/// Writes never fail from the caller's point of view. A channel that reaches
/// its cap requests termination with [`TerminationCause::LogExhausted`] and
/// silently drops whatever follows.
#[derive(Clone)]
pub struct RunJournal {
    inner: Arc<JournalInner>,
}

impl RunJournal {
    pub fn new(sink: Arc<dyn LogSink>, termination: TerminationFlag) -> Self {
        Self {
            inner: Arc::new(JournalInner {
                sink,
                termination,
                exhausted: Default::default(),
            }),
        }
    }

    pub fn message(&self, text: &str) {
        tracing::info!("{}", text);
        self.write(LogChannel::Message, text);
    }

    pub fn error(&self, text: &str) {
        tracing::warn!("{}", text);
        self.write(LogChannel::Error, text);
    }

    /// Append a possibly multi-line report; only the first line carries the timestamp
    pub fn summary(&self, text: &str) {
        tracing::info!("{}", text);
        self.write(LogChannel::Summary, text);
    }

    /// True once `channel` has hit its cap
    pub fn is_exhausted(&self, channel: LogChannel) -> bool {
        self.inner.exhausted[channel.index()].load(Ordering::SeqCst)
    }

    pub fn flush(&self) {
        if let Err(e) = self.inner.sink.flush() {
            tracing::error!("Failed to flush run journal: {}", e);
        }
    }

    fn write(&self, channel: LogChannel, text: &str) {
        if self.is_exhausted(channel) {
            return;
        }

        // One append per entry, so a report that does not fit leaves nothing behind
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        let entry = format!("{} {}", stamp, text.trim_end_matches('\n'));

        match self.inner.sink.append(channel, &entry) {
            Ok(()) => {}
            Err(SinkError::CapacityExceeded { limit, .. }) => {
                self.inner.exhausted[channel.index()].store(true, Ordering::SeqCst);
                tracing::error!("{} log reached {} bytes, stopping the run", channel, limit);
                self.inner.termination.request(TerminationCause::LogExhausted);
            }
            Err(e) => {
                tracing::error!("Failed to write {} log: {}", channel, e);
            }
        }
    }
}
