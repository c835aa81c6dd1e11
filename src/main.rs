//! Rune Forge Server
//!
//! Authoritative session server for Rune Forge: accepts WebSocket
//! connections, authenticates them, and routes clients into lobbies and
//! combat sessions via `network::ConnectionBroker`.

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rune_forge::network::{AuthConfig, ConnectionBroker, ServerConfig};
use rune_forge::persistence::InMemoryStorage;
use rune_forge::VERSION;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    info!("Rune Forge Server v{}", VERSION);

    let config = ServerConfig {
        bind_addr: std::env::var("RUNE_FORGE_BIND_ADDR")
            .ok()
            .and_then(|addr| addr.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:8080".parse().unwrap()),
        ..Default::default()
    };
    let auth = AuthConfig::from_env();

    if !auth.is_configured() {
        tracing::warn!("no auth secret or public key configured; all Auth messages will be rejected");
    }

    let storage = InMemoryStorage::shared();

    info!(addr = %config.bind_addr, "starting connection broker");
    let broker = ConnectionBroker::new(config, auth, storage);
    if let Err(err) = broker.run().await {
        tracing::error!(error = %err, "connection broker exited with an error");
        std::process::exit(1);
    }
}
