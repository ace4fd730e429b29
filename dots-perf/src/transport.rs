//! Newline-delimited line transport

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::PerfError;

/// Line-oriented request/response transport over any byte stream
pub struct LineTransport<S> {
    stream: BufReader<S>,
    line: String,
}

impl LineTransport<TcpStream> {
    /// Open a TCP connection to a performance relay
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, PerfError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> LineTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            line: String::new(),
        }
    }

    /// Send one line, appending the newline delimiter
    pub async fn send_line(&mut self, line: &str) -> Result<(), PerfError> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;
        Ok(())
    }

    /// Receive one line without its delimiter
    pub async fn recv_line(&mut self) -> Result<String, PerfError> {
        self.line.clear();
        let read = self.stream.read_line(&mut self.line).await?;

        if read == 0 {
            return Err(PerfError::ConnectionClosed);
        }

        Ok(self.line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send a request and wait for its reply
    pub async fn request(&mut self, line: &str) -> Result<String, PerfError> {
        self.send_line(line).await?;
        self.recv_line().await
    }

    /// Receive the next line, or `None` when the peer closed cleanly
    pub async fn next_line(&mut self) -> Result<Option<String>, PerfError> {
        match self.recv_line().await {
            Ok(line) => Ok(Some(line)),
            Err(PerfError::ConnectionClosed) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
