use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{select, sync::Mutex};
use tracing::debug;

use super::{CloseSignal, Payload, Transport, TransportError};

/// A WebSocket accepted by the room server.
///
/// Text and binary frames both carry payloads. Outgoing payloads go out as
/// text when they are valid UTF-8 and as binary otherwise.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    closed: CloseSignal,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: CloseSignal::new(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn receive_frame(&self) -> Result<Option<Payload>, TransportError> {
        if self.closed.is_fired() {
            return Ok(None);
        }

        let mut stream = self.stream.lock().await;
        loop {
            let next = select! {
                next = stream.next() => next,
                _ = self.closed.fired() => return Ok(None),
            };
            match next {
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                // axum answers pings itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(error)) => return Err(error.into()),
            }
        }
    }

    async fn send_frame(&self, payload: Payload) -> Result<(), TransportError> {
        if self.closed.is_fired() {
            return Err(TransportError::Closed);
        }

        let message = match String::from_utf8(payload.to_vec()) {
            Ok(text) => Message::Text(text),
            Err(not_text) => Message::Binary(not_text.into_bytes()),
        };
        let mut sink = self.sink.lock().await;
        select! {
            sent = sink.send(message) => sent.map_err(TransportError::from),
            _ = self.closed.fired() => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        if !self.closed.fire() {
            return;
        }
        let mut sink = self.sink.lock().await;
        if let Err(error) = sink.close().await {
            debug!(?error, "websocket close failed");
        }
    }
}
