//! modelvault server binary.

use anyhow::{Context, Result};
use clap::Parser;
use modelvault_server::config::ServerConfig;
use modelvault_server::{create_router, AppState, Coordinator, HubFetcher, JsonStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("modelvault_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();

    tokio::fs::create_dir_all(&config.mount_point)
        .await
        .with_context(|| format!("Failed to create {}", config.mount_point.display()))?;
    let mount_point = tokio::fs::canonicalize(&config.mount_point)
        .await
        .with_context(|| format!("Failed to resolve {}", config.mount_point.display()))?;

    let store = JsonStore::open(&mount_point)
        .await
        .context("Failed to open catalog store")?;
    let fetcher = HubFetcher::new(config.hub_endpoint.clone(), mount_point.clone())
        .with_token(config.hub_token.clone());
    let coordinator = Coordinator::open(store, Arc::new(fetcher), config.fetch_timeout())
        .await
        .context("Failed to load catalog documents")?;

    let app = create_router(AppState::new(Arc::new(coordinator)));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        mount_point = %mount_point.display(),
        hub = %config.hub_endpoint,
        "modelvault server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
