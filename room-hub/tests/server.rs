use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use room_hub::{
    hub::{Hub, HubConfig, HubHandle, HubStats},
    server, trace,
};
use tokio::{net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(2);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[tokio::test]
async fn websocket_clients_share_one_room() -> Result<()> {
    let (hub, room) = Hub::new(HubConfig::default(), trace::off())?;
    tokio::spawn(hub.run());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(server::serve(listener, room.clone(), async move {
        let _ = shutdown_rx.await;
    }));

    let mut alice = connect(addr).await?;
    let mut bob = connect(addr).await?;
    wait_for_stats(&room, |stats| stats.members.len() == 2).await?;

    alice.send(Message::text("hi bob")).await?;
    assert_eq!(next_text(&mut bob).await?, "hi bob");
    assert_eq!(next_text(&mut alice).await?, "hi bob");

    // Binary frames that are not UTF-8 come back as binary frames.
    bob.send(Message::binary(vec![0xff, 0x00, 0xfe])).await?;
    let echoed = next_message(&mut alice).await?;
    assert_eq!(echoed.into_data().to_vec(), vec![0xff, 0x00, 0xfe]);

    bob.close(None).await?;
    wait_for_stats(&room, |stats| stats.members.len() == 1).await?;

    alice.close(None).await?;
    wait_for_stats(&room, |stats| stats.members.is_empty()).await?;

    let _ = shutdown_tx.send(());
    timeout(WAIT, server)
        .await
        .context("server did not shut down")???;
    Ok(())
}

#[tokio::test]
async fn unknown_paths_are_not_upgraded() -> Result<()> {
    let (hub, room) = Hub::new(HubConfig::default(), trace::off())?;
    tokio::spawn(hub.run());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(server::serve(listener, room, std::future::pending()));

    let result = connect_async(format!("ws://{addr}/lobby")).await;
    assert!(result.is_err(), "only /room accepts websocket upgrades");
    Ok(())
}

async fn connect(addr: SocketAddr) -> Result<Client> {
    let (stream, _response) = connect_async(format!("ws://{addr}/room"))
        .await
        .context("websocket handshake failed")?;
    Ok(stream)
}

async fn next_message(client: &mut Client) -> Result<Message> {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow!("server closed the stream"))??;
        if message.is_ping() || message.is_pong() {
            continue;
        }
        return Ok(message);
    }
}

async fn next_text(client: &mut Client) -> Result<String> {
    let message = next_message(client).await?;
    Ok(message.to_text()?.to_string())
}

async fn wait_for_stats(room: &HubHandle, ready: impl Fn(&HubStats) -> bool) -> Result<HubStats> {
    timeout(WAIT, async {
        loop {
            let stats = room.stats().await?;
            if ready(&stats) {
                return anyhow::Ok(stats);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("timed out waiting for hub stats")?
}
