//! Drover coordinator binary.
//!
//! Usage:
//!     drover-coordinator --bind 127.0.0.1:7450 --database sqlite:/path/to/drover.db

use anyhow::{Context, Result};
use clap::Parser;
use drover_coordinator::{
    api, AppState, CoordinatorConfig, QueueWriter, ReclamationLoop, SubmissionQueue,
};
use drover_coordinator::store::{DeadLetterStore, JobStore};
use drover_db::{create_pool, init_schema, DbConfig};
use drover_logging::LogConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CoordinatorConfig::parse();
    let _log_guard = drover_logging::init_logging(LogConfig {
        app_name: "drover-coordinator",
        verbose: config.verbose,
    })?;

    config.validate().context("Invalid configuration")?;

    info!("Starting Drover coordinator");
    info!("  Bind: {}", config.bind);
    let database_url = config.database_url();
    info!("  Database: {}", database_url);

    let pool = create_pool(DbConfig::from_url(&database_url)?)
        .await
        .context("Failed to connect to the store")?;
    init_schema(&pool)
        .await
        .context("Failed to initialize the store schema")?;

    // C1 -> C2 hand-off plus the writer draining it.
    let (submissions, handoff_rx) =
        SubmissionQueue::new(config.submit_queue_depth, config.default_max_retries);
    let writer = QueueWriter::new(
        handoff_rx,
        JobStore::new(pool.clone()),
        DeadLetterStore::new(pool.clone()),
        config.writer_retry_budget,
    );
    tokio::spawn(writer.run());

    // C4: single-writer liveness/recovery loop.
    let reaper = ReclamationLoop::new(
        pool.clone(),
        config.stale_threshold(),
        config.reclaim_interval(),
    );
    tokio::spawn(reaper.run());

    let state = AppState::new(pool, submissions);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Coordinator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
