use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::Mutex,
};
use tracing::debug;

use super::{CloseSignal, Payload, Transport, TransportError};

/// Longest line accepted from a peer, line break included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Newline-delimited frames over any byte stream.
///
/// Each frame is one line; a trailing `\r` is dropped and blank lines are
/// skipped, which keeps the relay usable from netcat-style tools. A line
/// longer than the configured maximum is a framing error.
pub struct LineTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    max_line: usize,
    closed: CloseSignal,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            max_line: DEFAULT_MAX_LINE_BYTES,
            closed: CloseSignal::new(),
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }
}

impl LineTransport<BufReader<OwnedReadHalf>, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(BufReader::new(reader), writer)
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn receive_frame(&self) -> Result<Option<Payload>, TransportError> {
        if self.closed.is_fired() {
            return Ok(None);
        }

        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        loop {
            line.clear();
            let mut limited = (&mut *reader).take(self.max_line as u64);
            let bytes = select! {
                read = limited.read_until(b'\n', &mut line) => read?,
                _ = self.closed.fired() => return Ok(None),
            };
            if bytes == 0 {
                return Ok(None);
            }
            if bytes >= self.max_line && !line.ends_with(b"\n") {
                return Err(TransportError::Framing(format!(
                    "line exceeds {} bytes",
                    self.max_line
                )));
            }

            let frame = trim_line_ending(&line);
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(frame)));
        }
    }

    async fn send_frame(&self, payload: Payload) -> Result<(), TransportError> {
        if payload.contains(&b'\n') {
            return Err(TransportError::Framing(
                "payload contains a line break".to_string(),
            ));
        }
        if self.closed.is_fired() {
            return Err(TransportError::Closed);
        }

        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(&payload).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        select! {
            written = write => written.map_err(TransportError::from),
            _ = self.closed.fired() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        if !self.closed.fire() {
            return;
        }
        // Any send in flight has given up the writer by now.
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.shutdown().await {
            debug!(?error, "line transport shutdown failed");
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
