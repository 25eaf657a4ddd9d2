//! One connected participant: a transport plus its inbound and outbound
//! pumps.
//!
//! [`Session::join`] registers a fresh outbound mailbox with the hub;
//! [`Session::run`] then spawns the outbound pump and drives the inbound
//! pump on the calling task. Leaving the room is tied to a drop guard owned
//! by the session, so the hub hears about it on every exit path: a clean
//! hangup, a receive error, an eviction that closed the transport from the
//! other side, a panic, or a session that was never run at all.

use std::{fmt::Display, sync::Arc};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    hub::{HubError, HubHandle, SessionId},
    transport::{Payload, Transport, TransportError},
};

/// How the inbound pump stopped.
#[derive(Debug)]
pub enum InboundEnd {
    /// The connection closed, from either end.
    Disconnected,
    Failed(TransportError),
    /// The hub stopped accepting broadcasts.
    RoomClosed,
}

/// How the outbound pump stopped.
#[derive(Debug)]
pub enum OutboundEnd {
    /// The mailbox was closed and everything queued was written, or the
    /// session closed the transport itself and what was left got discarded.
    Drained,
    Failed(TransportError),
}

pub struct SessionOutcome {
    pub id: SessionId,
    pub inbound: InboundEnd,
    /// Resolves once the outbound pump has written what was left and
    /// closed the transport.
    pub outbound: JoinHandle<OutboundEnd>,
}

impl SessionOutcome {
    pub fn log(&self, peer: impl Display) {
        match &self.inbound {
            InboundEnd::Failed(error) => {
                info!(%peer, session = self.id, %error, "client left after a transport error")
            }
            InboundEnd::Disconnected | InboundEnd::RoomClosed => {
                info!(%peer, session = self.id, "client left")
            }
        }
    }
}

pub struct Session<T> {
    id: SessionId,
    transport: Arc<T>,
    outbound: mpsc::Receiver<Payload>,
    leave: LeaveGuard,
}

impl<T: Transport> Session<T> {
    /// Joins `room` with a new outbound mailbox for `transport`.
    pub fn join(room: &HubHandle, transport: T) -> Result<Self, HubError> {
        let id = room.next_session_id();
        let (outbound_tx, outbound) = mpsc::channel(room.mailbox_capacity());
        room.join(id, outbound_tx)?;

        Ok(Self {
            id,
            transport: Arc::new(transport),
            outbound,
            leave: LeaveGuard {
                room: room.clone(),
                id,
            },
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Pumps frames until the transport stops delivering them. Returns once
    /// the inbound pump is done and the hub has been told to drop this
    /// session; the outbound pump may still be draining.
    pub async fn run(self) -> SessionOutcome {
        let Session {
            id,
            transport,
            outbound,
            leave,
        } = self;

        let writer = tokio::spawn(write_pump(id, Arc::clone(&transport), outbound));
        let inbound = read_pump(id, transport.as_ref(), &leave.room).await;
        transport.close().await;
        drop(leave);

        SessionOutcome {
            id,
            inbound,
            outbound: writer,
        }
    }
}

struct LeaveGuard {
    room: HubHandle,
    id: SessionId,
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        if self.room.leave(self.id).is_err() {
            debug!(session = self.id, "room already stopped, nothing to leave");
        }
    }
}

async fn read_pump<T: Transport>(id: SessionId, transport: &T, room: &HubHandle) -> InboundEnd {
    loop {
        match transport.receive_frame().await {
            Ok(Some(payload)) => {
                if room.broadcast(payload).await.is_err() {
                    return InboundEnd::RoomClosed;
                }
            }
            Ok(None) => {
                debug!(session = id, "transport closed");
                return InboundEnd::Disconnected;
            }
            Err(error) => {
                debug!(session = id, %error, "receive failed");
                return InboundEnd::Failed(error);
            }
        }
    }
}

async fn write_pump<T: Transport>(
    id: SessionId,
    transport: Arc<T>,
    mut outbound: mpsc::Receiver<Payload>,
) -> OutboundEnd {
    // `recv` keeps yielding queued payloads after the hub drops its sender
    // and only returns `None` once the mailbox is empty.
    let end = loop {
        let Some(payload) = outbound.recv().await else {
            break OutboundEnd::Drained;
        };
        match transport.send_frame(payload).await {
            Ok(()) => {}
            Err(TransportError::Closed) => {
                debug!(
                    session = id,
                    dropped = outbound.len(),
                    "transport closed locally, discarding queued payloads"
                );
                break OutboundEnd::Drained;
            }
            Err(error) => {
                debug!(session = id, %error, "send failed");
                break OutboundEnd::Failed(error);
            }
        }
    };
    transport.close().await;
    end
}
