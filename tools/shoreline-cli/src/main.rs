//! Shoreline Router Server
//!
//! Parses the process configuration, connects to Redis, boots the router
//! event loop, and accepts WebSocket connections until the process is
//! killed (spec.md §6.3).

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shoreline_router::{Cli, Router, RouterConfig};
use shoreline_store::{RedisStore, SessionStore};
use shoreline_transport::{TransportServer, WebSocketServer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config: RouterConfig = cli.into();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(redis = %config.redis_host, db = config.redis_db, "connecting to redis");
    let redis = RedisStore::connect(&config.redis_host, config.redis_db).await?;
    let store = Arc::new(SessionStore::new(Arc::new(redis)));

    tracing::info!("recovering router state from persisted sessions");
    let (router, handle) = Router::new(store).await?;

    tokio::spawn(async move {
        if let Err(e) = router.run().await {
            tracing::error!("router event loop exited with a fatal error: {e}");
            std::process::exit(1);
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let mut server = match WebSocketServer::bind(&bind_addr).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(addr = %bind_addr, "failed to bind websocket listener: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %bind_addr, "accepting connections");
    loop {
        match server.accept().await {
            Ok(accepted) => {
                tokio::spawn(shoreline_router::run_connection(accepted, handle.clone()));
            }
            Err(e) => {
                tracing::error!("failed to accept connection: {e}");
            }
        }
    }
}
