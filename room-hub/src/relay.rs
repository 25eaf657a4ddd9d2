//! Raw TCP front door for a room: every accepted connection becomes a
//! session speaking newline-delimited frames.

use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{hub::HubHandle, session::Session, transport::LineTransport};

pub struct Relay {
    listener: TcpListener,
    room: HubHandle,
}

impl Relay {
    pub fn new(listener: TcpListener, room: HubHandle) -> Self {
        Self { listener, room }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves. Sessions already
    /// running are left to the hub.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay { listener, room } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &room);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, room: &HubHandle) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, room),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, room: &HubHandle) {
    let room = room.clone();
    tokio::spawn(async move {
        match Session::join(&room, LineTransport::from_tcp(stream)) {
            Ok(session) => {
                info!(%peer, session = session.id(), "client joined");
                session.run().await.log(peer);
            }
            Err(err) => warn!(%peer, error = %err, "could not join room"),
        }
    });
}
