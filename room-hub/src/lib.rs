//! A chat room that relays every message to every connected client.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`hub`] owns room membership and fans messages out from a single task.
//! - [`session`] runs the inbound and outbound pumps of one client.
//! - [`transport`] defines the framed connection a session talks through,
//!   with line-based and WebSocket implementations.
//! - [`trace`] provides sinks for human-readable room events.
//! - [`server`] exposes a room over WebSockets with axum.
//! - [`relay`] exposes a room over raw TCP.
//! - [`cli`] parses the command-line interface for both front doors.
//!
//! Integration tests use this crate directly to exercise the hub through
//! its handle and both front doors over loopback.

pub mod cli;
pub mod hub;
pub mod relay;
pub mod server;
pub mod session;
pub mod trace;
pub mod transport;

pub use hub::{Hub, HubConfig, HubError, HubHandle, HubStats, SessionId};
pub use session::{InboundEnd, OutboundEnd, Session, SessionOutcome};
pub use trace::Tracer;
pub use transport::{Payload, Transport, TransportError};
