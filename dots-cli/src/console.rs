//! Operator console: a STOP command on stdin ends the run

use dots_core::{TerminationCause, TerminationFlag};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::warn;

const STOP_COMMAND: &str = "STOP";
const CONFIRM_PROMPT: &str = "Are you sure you want to stop the test? (y/n)";
const HINT: &str = "Type STOP to end the test";

/// Blocking source of operator input lines
pub trait LineSource {
    fn read_line(&mut self) -> Result<String, ReadlineError>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self) -> Result<String, ReadlineError> {
        let line = self.readline("")?;
        if !line.trim().is_empty() {
            let _ = self.add_history_entry(line.as_str());
        }
        Ok(line)
    }
}

/// Read operator lines with rustyline on a dedicated thread.
///
/// A blocking read cannot be cancelled, so the thread is left detached and
/// dies with the process. When stdin is not a terminal rustyline reads plain
/// lines.
pub fn operator_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || match DefaultEditor::new() {
        Ok(mut editor) => forward_lines(&mut editor, &tx),
        Err(e) => warn!("Operator console unavailable: {}", e),
    });
    rx
}

/// Send lines until end of input, an interrupt, or a closed receiver
fn forward_lines(source: &mut impl LineSource, tx: &mpsc::UnboundedSender<String>) {
    loop {
        match source.read_line() {
            Ok(line) => {
                if tx.send(line).is_err() {
                    return;
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => return,
            Err(e) => {
                warn!("Operator console input error: {}", e);
                return;
            }
        }
    }
}

/// Read operator commands until termination, a confirmed STOP, or end of input
pub async fn run_console<W>(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut out: W,
    termination: TerminationFlag,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut confirming = false;
    say(&mut out, HINT).await?;

    loop {
        let line = tokio::select! {
            biased;
            _ = termination.requested() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let input = line.trim();

        if confirming {
            confirming = false;
            if input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes") {
                say(&mut out, "Stopping the test, waiting for workers to finish").await?;
                termination.request(TerminationCause::Operator);
                return Ok(());
            }
            say(&mut out, "The test continues").await?;
        } else if input.eq_ignore_ascii_case(STOP_COMMAND) {
            confirming = true;
            say(&mut out, CONFIRM_PROMPT).await?;
        } else if !input.is_empty() {
            say(&mut out, HINT).await?;
        }
    }
}

async fn say<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
