use std::{net::SocketAddr, sync::Arc};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    hub::{DEFAULT_INCOMING_CAPACITY, DEFAULT_MAILBOX_CAPACITY, HubConfig},
    trace::{self, Tracer, TracingTracer, WriterTracer},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the room over WebSockets at `/room`.
    Serve(ServeArgs),
    /// Serve the room over raw TCP, one message per line.
    Relay(RelayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the HTTP server should bind to. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub room: RoomArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Socket address the relay should bind to. Use 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub room: RoomArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RoomArgs {
    /// Messages buffered per client before a slow client is dropped.
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    pub mailbox_capacity: usize,

    /// Messages waiting for the hub before senders are held back.
    #[arg(long, default_value_t = DEFAULT_INCOMING_CAPACITY)]
    pub incoming_capacity: usize,

    /// Where room events (joins, deliveries, evictions) are reported.
    #[arg(long, value_enum, default_value_t = TraceSink::Log)]
    pub trace: TraceSink,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSink {
    /// Through the process log, at info level.
    Log,
    /// One plain line per event on stdout.
    Stdout,
    /// Nowhere.
    Off,
}

impl RoomArgs {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            mailbox_capacity: self.mailbox_capacity,
            incoming_capacity: self.incoming_capacity,
        }
    }

    pub fn tracer(&self) -> Arc<dyn Tracer> {
        match self.trace {
            TraceSink::Log => Arc::new(TracingTracer),
            TraceSink::Stdout => Arc::new(WriterTracer::stdout()),
            TraceSink::Off => trace::off(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_uses_room_defaults() {
        let cli = Cli::try_parse_from(["room-hub", "serve"]).expect("parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.listen, "127.0.0.1:8080".parse::<SocketAddr>().expect("addr"));
        assert_eq!(args.room.hub_config(), HubConfig::default());
        assert_eq!(args.room.trace, TraceSink::Log);
    }

    #[test]
    fn relay_accepts_room_overrides() {
        let cli = Cli::try_parse_from([
            "room-hub",
            "relay",
            "--listen",
            "127.0.0.1:0",
            "--mailbox-capacity",
            "2",
            "--incoming-capacity",
            "8",
            "--trace",
            "off",
        ])
        .expect("parse");
        let Command::Relay(args) = cli.command else {
            panic!("expected relay command");
        };
        assert_eq!(args.listen.port(), 0);
        assert_eq!(
            args.room.hub_config(),
            HubConfig {
                mailbox_capacity: 2,
                incoming_capacity: 8,
            }
        );
        assert_eq!(args.room.trace, TraceSink::Off);
    }
}
