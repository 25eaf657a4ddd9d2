//! The room's single authority over membership and fan-out.
//!
//! [`Hub`] owns the set of live sessions and is the only code that ever
//! touches it. Everything else talks to it through a cloneable [`HubHandle`]
//! that turns `join`, `leave`, and `broadcast` into mailbox sends. The loop
//! in [`Hub::run_until`] takes one event at a time, so membership changes
//! and deliveries are totally ordered without a lock.
//!
//! Join and leave share one FIFO mailbox: a session's leave is always queued
//! behind its own join. Broadcast payloads arrive on a separate bounded
//! mailbox, which is where inbound pumps feel backpressure. The loop drains
//! membership ahead of broadcasts, so anything that joined before a payload
//! was queued receives it.
//!
//! Delivery never waits on a session. Each payload is offered to every
//! outbound mailbox with `try_send`; a session whose mailbox is full (or
//! whose outbound pump has already gone) is evicted on the spot. The hub
//! holds the only sender of each mailbox, so removing a session from the map
//! is what closes its mailbox, and it can only happen once.

use std::{
    collections::{HashMap, hash_map::Entry},
    future::{self, Future},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use thiserror::Error;
use tokio::{
    select,
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
};
use tracing::{debug, info, warn};

use crate::{trace::Tracer, transport::Payload};

pub type SessionId = u64;

/// Outbound mailbox size per session.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Broadcast payloads that may wait for the hub before inbound pumps block.
pub const DEFAULT_INCOMING_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub mailbox_capacity: usize,
    pub incoming_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            incoming_capacity: DEFAULT_INCOMING_CAPACITY,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("room hub is no longer running")]
    Closed,
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Point-in-time view of the room, answered by the hub loop itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Ids of the current members, ascending.
    pub members: Vec<SessionId>,
    pub broadcasts: u64,
    pub delivered: u64,
    pub evicted: u64,
}

enum Membership {
    Join {
        id: SessionId,
        outbound: mpsc::Sender<Payload>,
    },
    Leave {
        id: SessionId,
    },
    Stats {
        respond_to: oneshot::Sender<HubStats>,
    },
}

enum Event {
    Membership(Membership),
    Broadcast(Payload),
}

/// Cheap, cloneable entry point into a running hub.
///
/// The hub keeps running for as long as at least one handle exists (or
/// until the shutdown future passed to [`Hub::run_until`] resolves).
#[derive(Clone)]
pub struct HubHandle {
    membership_tx: mpsc::UnboundedSender<Membership>,
    incoming_tx: mpsc::Sender<Payload>,
    next_id: Arc<AtomicU64>,
    mailbox_capacity: usize,
}

impl HubHandle {
    /// Allocates an id that no other session of this hub has used.
    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Capacity sessions should give their outbound mailbox.
    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    /// Registers `outbound` as the mailbox of session `id`.
    pub fn join(&self, id: SessionId, outbound: mpsc::Sender<Payload>) -> Result<(), HubError> {
        self.membership_tx
            .send(Membership::Join { id, outbound })
            .map_err(|_| HubError::Closed)
    }

    /// Asks the hub to drop session `id`. Unknown or already removed ids are
    /// ignored by the hub.
    pub fn leave(&self, id: SessionId) -> Result<(), HubError> {
        self.membership_tx
            .send(Membership::Leave { id })
            .map_err(|_| HubError::Closed)
    }

    /// Queues `payload` for fan-out to every member. Waits only while the
    /// hub's incoming mailbox is full.
    pub async fn broadcast(&self, payload: impl Into<Payload>) -> Result<(), HubError> {
        self.incoming_tx
            .send(payload.into())
            .await
            .map_err(|_| HubError::Closed)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (respond_to, response) = oneshot::channel();
        self.membership_tx
            .send(Membership::Stats { respond_to })
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }
}

pub struct Hub {
    sessions: HashMap<SessionId, mpsc::Sender<Payload>>,
    membership_rx: mpsc::UnboundedReceiver<Membership>,
    incoming_rx: mpsc::Receiver<Payload>,
    tracer: Arc<dyn Tracer>,
    broadcasts: u64,
    delivered: u64,
    evicted: u64,
}

impl Hub {
    pub fn new(config: HubConfig, tracer: Arc<dyn Tracer>) -> Result<(Self, HubHandle), HubError> {
        if config.mailbox_capacity == 0 {
            return Err(HubError::ZeroCapacity("mailbox capacity"));
        }
        if config.incoming_capacity == 0 {
            return Err(HubError::ZeroCapacity("incoming capacity"));
        }

        let (membership_tx, membership_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::channel(config.incoming_capacity);

        let hub = Self {
            sessions: HashMap::new(),
            membership_rx,
            incoming_rx,
            tracer,
            broadcasts: 0,
            delivered: 0,
            evicted: 0,
        };
        let handle = HubHandle {
            membership_tx,
            incoming_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            mailbox_capacity: config.mailbox_capacity,
        };
        Ok((hub, handle))
    }

    /// Runs until every [`HubHandle`] has been dropped.
    pub async fn run(self) {
        self.run_until(future::pending()).await
    }

    /// Runs until `shutdown` resolves or every handle has been dropped, then
    /// closes the mailboxes of the remaining members.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let event = select! {
                _ = &mut shutdown => {
                    info!("room hub shutting down");
                    break;
                }
                event = self.next_event() => event,
            };

            match event {
                Some(Event::Membership(request)) => self.handle_membership(request),
                Some(Event::Broadcast(payload)) => self.handle_broadcast(payload),
                None => {
                    debug!("every room handle dropped");
                    break;
                }
            }
        }

        self.close_all();
    }

    async fn next_event(&mut self) -> Option<Event> {
        // Membership first: a join queued before a broadcast is applied
        // before it, so a session always hears its own first frame.
        select! {
            biased;
            Some(request) = self.membership_rx.recv() => Some(Event::Membership(request)),
            Some(payload) = self.incoming_rx.recv() => Some(Event::Broadcast(payload)),
            else => None,
        }
    }

    fn handle_membership(&mut self, request: Membership) {
        match request {
            Membership::Join { id, outbound } => match self.sessions.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(outbound);
                    self.tracer.trace(&format!("session {id} joined"));
                }
                Entry::Occupied(_) => {
                    debug!(session = id, "ignoring duplicate join");
                }
            },
            Membership::Leave { id } => {
                // Dropping the sender closes the mailbox.
                if self.sessions.remove(&id).is_some() {
                    self.tracer.trace(&format!("session {id} left"));
                } else {
                    debug!(session = id, "ignoring leave for a session that is not a member");
                }
            }
            Membership::Stats { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    fn handle_broadcast(&mut self, payload: Payload) {
        self.broadcasts += 1;
        debug!(
            bytes = payload.len(),
            sessions = self.sessions.len(),
            "broadcasting"
        );

        let tracer = &self.tracer;
        let mut delivered = 0;
        let mut evicted = 0;
        self.sessions
            .retain(|&id, outbound| match outbound.try_send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    tracer.trace(&format!("delivered message to session {id}"));
                    true
                }
                Err(TrySendError::Full(_)) => {
                    evicted += 1;
                    warn!(session = id, "outbound mailbox full, evicting session");
                    tracer.trace(&format!("evicted session {id}: mailbox full"));
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    evicted += 1;
                    tracer.trace(&format!("evicted session {id}: mailbox closed"));
                    false
                }
            });
        self.delivered += delivered;
        self.evicted += evicted;
    }

    fn snapshot(&self) -> HubStats {
        let mut members: Vec<SessionId> = self.sessions.keys().copied().collect();
        members.sort_unstable();
        HubStats {
            members,
            broadcasts: self.broadcasts,
            delivered: self.delivered,
            evicted: self.evicted,
        }
    }

    fn close_all(&mut self) {
        for (id, _outbound) in self.sessions.drain() {
            self.tracer.trace(&format!("session {id} closed"));
        }
    }
}
