//! The framed connection a session talks through.
//!
//! A [`Transport`] is shared between the two pumps of one session: the
//! inbound pump calls [`Transport::receive_frame`], the outbound pump calls
//! [`Transport::send_frame`], and either of them may call
//! [`Transport::close`]. Closing wakes a pending receive (which then reports
//! a closed connection) and aborts a pending send, so whichever pump stops
//! first brings the other one down with it.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;

pub mod line;
pub mod ws;

pub use line::LineTransport;
pub use ws::WsTransport;

/// Opaque message body relayed by the room.
pub type Payload = Bytes;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("websocket failed: {0}")]
    WebSocket(#[from] axum::Error),
    #[error("frame rejected: {0}")]
    Framing(String),
    #[error("transport closed")]
    Closed,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Waits for the next frame. `Ok(None)` means the connection is over,
    /// either because the peer went away or because it was closed locally.
    async fn receive_frame(&self) -> Result<Option<Payload>, TransportError>;

    /// Writes one frame. Only the outbound pump calls this.
    async fn send_frame(&self, payload: Payload) -> Result<(), TransportError>;

    /// Idempotent.
    async fn close(&self);
}

/// One-way close flag shared by the read and write sides of a transport.
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Raises the flag. Returns `true` only for the call that raised it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let closed = *rx.borrow_and_update();
            if closed {
                return;
            }
            // The sender lives as long as `self`, so this only errors if the
            // signal itself is being torn down.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
