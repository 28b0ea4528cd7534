//! Tabula Server - Main entry point

use anyhow::Result;
use std::time::Duration;
use tabula_common::logging::{init_logging, LogConfig};
use tracing::{info, warn};

use tabula_server::{
    api::{self, AppState},
    config::Config,
    db,
    ingest::IngestionQueue,
    storage::Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("tabula-server")
        .filter_directives("tabula_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Tabula Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.to_db_config()).await?;
    db::run_migrations(&db_pool).await?;

    let storage = Storage::new(config.storage.clone()).await?;
    info!(root = %storage.root().display(), "Blob storage initialized");

    let (queue, dispatcher) =
        IngestionQueue::start(db_pool.clone(), storage.clone(), config.ingest.clone());

    let state = AppState {
        db: db_pool.clone(),
        storage,
        queue,
    };

    api::serve(state, &config).await?;

    // The router held the last queue handle; the dispatcher drains running jobs and exits
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    match tokio::time::timeout(drain, dispatcher).await {
        Ok(Ok(())) => info!("Ingestion dispatcher stopped"),
        Ok(Err(e)) => warn!("Ingestion dispatcher ended abnormally: {}", e),
        Err(_) => warn!("Ingestion jobs still running after {:?}, exiting", drain),
    }

    db_pool.close().await;

    Ok(())
}
