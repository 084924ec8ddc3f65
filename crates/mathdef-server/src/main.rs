use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use mathdef_server::collaborators::{ChannelMessenger, FilePersistence};
use mathdef_server::config::ServerConfig;
use mathdef_server::driver::{ServiceCommand, spawn_driver};
use mathdef_server::service::RoomService;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load();
    config.validate();
    let tick_rate_hz = config.tick.rate_hz;
    tracing::info!(tick_rate_hz, "mathdef server starting");

    let service = RoomService::new(
        config,
        ChannelMessenger::new(),
        FilePersistence::new("data/replays"),
    );
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let driver = spawn_driver(service, tick_rate_hz, command_rx);

    // Connection transport plugs into command_tx; until then the loop idles
    // over an empty room set.
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
    let _ = command_tx.send(ServiceCommand::Stop);
    let _ = driver.await;
}
