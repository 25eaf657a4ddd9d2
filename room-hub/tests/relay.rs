use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use room_hub::{
    hub::{Hub, HubConfig, HubHandle, HubStats},
    relay::Relay,
    trace::MemoryTracer,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn clients_receive_every_line_sent_to_the_room() -> Result<()> {
    let tracer = Arc::new(MemoryTracer::new());
    let (hub, room) = Hub::new(HubConfig::default(), tracer.clone())?;
    tokio::spawn(hub.run());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let relay = Relay::new(listener, room.clone());
    let addr = relay.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = relay.run_until(shutdown).await;
    });

    let (mut alice_reader, mut alice_writer) = connect(addr).await?;
    let (mut bob_reader, bob_writer) = connect(addr).await?;
    wait_for_stats(&room, |stats| stats.members.len() == 2).await?;

    alice_writer.write_all(b"hello bob\r\n").await?;
    assert_eq!(read_line(&mut bob_reader).await?, "hello bob");
    assert_eq!(read_line(&mut alice_reader).await?, "hello bob");

    // Bob hangs up; the room shrinks back to Alice alone.
    drop(bob_writer);
    drop(bob_reader);
    wait_for_stats(&room, |stats| stats.members.len() == 1).await?;
    assert_eq!(tracer.count("left"), 1);

    alice_writer.write_all(b"anyone?\n").await?;
    assert_eq!(read_line(&mut alice_reader).await?, "anyone?");

    alice_writer.shutdown().await?;
    wait_for_stats(&room, |stats| stats.members.is_empty()).await?;

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

async fn connect(addr: SocketAddr) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(WAIT, reader.read_line(&mut line))
        .await
        .context("timed out waiting for a line")??;
    anyhow::ensure!(bytes > 0, "relay closed the connection");
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
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
