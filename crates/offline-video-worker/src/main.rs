//! Offline video worker - offline-first cache in front of a static site
//!
//! Precaches the site's assets and its video on start, then serves every
//! request cache-first and answers video Range requests from the cache.

use cache_storage::CacheStorage;
use offline_video_worker::config::Config;
use offline_video_worker::network::HttpNetwork;
use offline_video_worker::server::{start_server, ServerState, SharedState};
use offline_video_worker::{OfflineWorker, Result, WorkerError};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("offline_video_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting offline video worker...");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.worker.origin);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache version: {}", config.worker.cache_name);
    info!("Precache: {} assets", config.worker.precache.len());

    let storage = CacheStorage::new(config.cache_dir.clone());
    storage.init().await?;

    let network = HttpNetwork::new(config.worker.origin.clone(), config.network_timeout)?;
    let worker = OfflineWorker::new(config.worker, storage, Arc::new(network));

    // A failed install leaves this version inactive
    worker.start().await?;

    let state: SharedState = Arc::new(ServerState::new(worker));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| WorkerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
