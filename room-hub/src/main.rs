use std::future::Future;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

use room_hub::{
    cli::{Cli, Command, RoomArgs},
    hub::{Hub, HubHandle},
    relay::Relay,
    server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let room = start_room(&args.room)?;
            let listener = TcpListener::bind(args.listen).await?;
            info!("room server listening on {}", listener.local_addr()?);
            let served = server::serve(listener, room.handle.clone(), ctrl_c()).await;
            room.stop().await?;
            served?;
        }
        Command::Relay(args) => {
            let room = start_room(&args.room)?;
            let listener = TcpListener::bind(args.listen).await?;
            let relay = Relay::new(listener, room.handle.clone());
            info!("room relay listening on {}", relay.local_addr()?);
            let relayed = relay.run_until(ctrl_c()).await;
            room.stop().await?;
            if let Err(err) = relayed {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
    }

    Ok(())
}

struct Room {
    handle: HubHandle,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Room {
    /// Stops the hub, which closes every remaining mailbox.
    async fn stop(self) -> Result<()> {
        let Room { handle, stop, task } = self;
        let _ = stop.send(());
        drop(handle);
        task.await.context("room hub task failed")
    }
}

fn start_room(args: &RoomArgs) -> Result<Room> {
    let (hub, handle) = Hub::new(args.hub_config(), args.tracer()).context("invalid room settings")?;
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(hub.run_until(async move {
        let _ = stopped.await;
    }));
    Ok(Room { handle, stop, task })
}

fn ctrl_c() -> impl Future<Output = ()> + Send + 'static {
    async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
    }
}
