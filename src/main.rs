//! Digit Guess Game Server
//!
//! Serves the guessing game over HTTP and WebSocket.
//! Configuration comes from the environment; see `ServerConfig::from_env`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use digit_guess::{GameServer, ServerConfig, DEFAULT_ATTEMPT_LIMIT, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;

    info!("Digit Guess Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!("Default attempt limit: {}", DEFAULT_ATTEMPT_LIMIT);
    if config.allowed_origins.is_empty() {
        info!("No ALLOWED_ORIGINS set, CORS handling disabled");
    }

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.context("server failed")?;

    info!("Server stopped");
    Ok(())
}
