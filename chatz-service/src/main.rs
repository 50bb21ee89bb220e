use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod db;
mod embeddings;
mod error;
mod ingestion;
mod logging;
mod ollama;
mod search;
mod service;
mod storage;

use crate::config::Config;
use crate::db::Database;
use crate::service::ChatzService;
use crate::storage::ObjectStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration comes first so logging can be set up from it
    let config = Config::load()?;
    let _log_guards = logging::init_logging(&config.logging)?;

    info!("Starting ChatZ service v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        data_dir = %config.storage.data_dir.display(),
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.storage.data_dir)?;

    // Initialize database
    let db_path = config.storage.database_path();
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    // Initialize blob store
    let store = Arc::new(ObjectStore::open(config.storage.blob_dir())?);
    let blob_count = store.count()?;
    info!(
        path = %store.root().display(),
        blobs = blob_count,
        "Object store initialized"
    );

    // Initialize the service
    let service = Arc::new(ChatzService::new(&config, db, store).await?);

    // Build the router
    let app = api::router(service, &config);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
