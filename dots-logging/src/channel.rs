use std::fmt;

/// One of the three journal channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    Message,
    Error,
    Summary,
}

impl LogChannel {
    pub const ALL: [LogChannel; 3] = [LogChannel::Message, LogChannel::Error, LogChannel::Summary];

    /// File name suffix used by the file sink
    pub fn suffix(&self) -> &'static str {
        match self {
            LogChannel::Message => "message",
            LogChannel::Error => "error",
            LogChannel::Summary => "summary",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            LogChannel::Message => 0,
            LogChannel::Error => 1,
            LogChannel::Summary => 2,
        }
    }
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
