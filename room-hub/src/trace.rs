//! Fire-and-forget sinks for human-readable room events.
//!
//! The hub reports every membership change and delivery outcome as a short
//! line of text (`"session 3 joined"`, `"evicted session 7: mailbox full"`).
//! Where those lines end up is decided by whoever builds the hub:
//!
//! - [`Off`] drops them.
//! - [`WriterTracer`] writes one line per event to any [`io::Write`].
//! - [`TracingTracer`] forwards them to `tracing` at info level.
//! - [`MemoryTracer`] keeps them in memory so tests can inspect them.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use tracing::info;

/// Receives room events. Implementations must not block the caller for long
/// and must never fail it.
pub trait Tracer: Send + Sync + 'static {
    fn trace(&self, event: &str);
}

/// Tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Off;

impl Tracer for Off {
    fn trace(&self, _event: &str) {}
}

/// Returns a shared tracer that ignores every event.
pub fn off() -> Arc<dyn Tracer> {
    Arc::new(Off)
}

/// Writes each event as its own line.
pub struct WriterTracer<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> WriterTracer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consumes the tracer and hands back the underlying writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl WriterTracer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> Tracer for WriterTracer<W> {
    fn trace(&self, event: &str) {
        // A poisoned or failing writer loses the event; the room keeps going.
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{event}");
        }
    }
}

/// Forwards events to the `tracing` subscriber installed by the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn trace(&self, event: &str) {
        info!(target: "room_hub::trace", "{event}");
    }
}

/// Records events in order of arrival.
#[derive(Debug, Default)]
pub struct MemoryTracer {
    events: Mutex<Vec<String>>,
}

impl MemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.contains(needle))
            .count()
    }
}

impl Tracer for MemoryTracer {
    fn trace(&self, event: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.to_string());
        }
    }
}
