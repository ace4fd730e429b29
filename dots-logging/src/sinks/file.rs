use super::{LogSink, SinkError};
use crate::LogChannel;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

struct ChannelFile {
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

/// Writes each channel to `<dir>/<case>-<channel>.log`, capped at `max_size` bytes per file
pub struct FileSink {
    files: [Mutex<ChannelFile>; 3],
    max_size: u64,
}

impl FileSink {
    pub fn new(dir: impl AsRef<Path>, case: &str, max_size: u64) -> std::io::Result<Self> {
        let dir = dir.as_ref();

        // Create the log directory if it doesn't exist
        std::fs::create_dir_all(dir)?;

        let open = |channel: LogChannel| -> std::io::Result<Mutex<ChannelFile>> {
            let path = dir.join(format!("{}-{}.log", case, channel.suffix()));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let size = file.metadata()?.len();
            Ok(Mutex::new(ChannelFile {
                path,
                writer: BufWriter::new(file),
                size,
            }))
        };

        Ok(Self {
            files: [
                open(LogChannel::Message)?,
                open(LogChannel::Error)?,
                open(LogChannel::Summary)?,
            ],
            max_size,
        })
    }

    pub fn path(&self, channel: LogChannel) -> PathBuf {
        self.files[channel.index()].lock().path.clone()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

impl LogSink for FileSink {
    fn append(&self, channel: LogChannel, line: &str) -> Result<(), SinkError> {
        let mut file = self.files[channel.index()].lock();

        let needed = line.len() as u64 + 1; // +1 for newline
        if file.size + needed > self.max_size {
            return Err(SinkError::CapacityExceeded {
                channel,
                limit: self.max_size,
            });
        }

        file.writer.write_all(line.as_bytes())?;
        file.writer.write_all(b"\n")?;
        file.writer.flush()?;
        file.size += needed;

        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        for file in &self.files {
            file.lock().writer.flush()?;
        }
        Ok(())
    }
}
