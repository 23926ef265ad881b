//! Dice Room Server
//!
//! Serves the static client and the room websocket on one port.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dice_room::{RoomServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    info!("Dice Room Server v{}", VERSION);
    info!(
        static_dir = %config.static_dir.display(),
        max_connections = config.max_connections,
        grace_ms = u64::try_from(config.grace_period.as_millis()).unwrap_or(u64::MAX),
        cooldown_ms = u64::try_from(config.roll_cooldown.as_millis()).unwrap_or(u64::MAX),
        "configuration loaded"
    );

    let server = Arc::new(RoomServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await.context("room server stopped")?;
    Ok(())
}
