//! WebSocket front door for a room, served by axum at `GET /room`.

use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{hub::HubHandle, session::Session, transport::WsTransport};

/// The upgrade handler reads the peer address, so the router has to be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`, as
/// [`serve`] does.
pub fn router(room: HubHandle) -> Router {
    Router::new()
        .route("/room", get(upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(room)
}

/// Serves [`router`] on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, room: HubHandle, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(room).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("room server failed")
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(room): State<HubHandle>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, peer, room))
}

async fn run_socket(socket: WebSocket, peer: SocketAddr, room: HubHandle) {
    match Session::join(&room, WsTransport::new(socket)) {
        Ok(session) => {
            info!(%peer, session = session.id(), "client joined");
            session.run().await.log(peer);
        }
        Err(err) => warn!(%peer, error = %err, "could not join room"),
    }
}
