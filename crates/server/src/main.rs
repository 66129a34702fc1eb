//! ringside-server entry point.
//!
//! Boots the offline-first reverse proxy: installs and activates the
//! configured version (or resumes the previous one), then answers every
//! request through the router. Logs go to stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use ringside_client::{HttpNetwork, NetworkConfig};
use ringside_core::{AppConfig, CacheStorage};
use ringside_worker::{Host, NotificationCenter, Registration, WindowClients};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.version, origin = %config.origin, "Starting ringside-server");

    let storage = CacheStorage::open(&config.db_path).await?;
    let network = Arc::new(HttpNetwork::new(NetworkConfig::from(&config))?);
    let notifications = Arc::new(NotificationCenter::new());
    let clients = Arc::new(WindowClients::new());
    let host = Host::new(network, clients.clone(), notifications.clone());
    let registration = Arc::new(Registration::new(storage, host));

    if let Err(e) = registration.update(&config).await {
        tracing::warn!(error = %e, "Update failed");
    }
    match registration.controller().await {
        Some(worker) => tracing::info!(version = %worker.version(), "Router in control"),
        None => tracing::warn!("No active version, passing requests straight through"),
    }

    let state = routes::AppState::new(registration, notifications, clients, &config)?;
    let tracker = state.tracker.clone();
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracker.close();
    tracker.wait().await;
    tracing::info!("Shut down");

    Ok(())
}
