//! Shared logging utilities for Drover binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "drover_coordinator=info,drover_worker=info,drover_db=info,tower_http=warn";

/// Logging configuration shared by Drover binaries.
pub struct LogConfig<'a> {
    /// Base name of the rolling log file, e.g. `"drover-coordinator"`.
    pub app_name: &'a str,
    /// Mirror the file-level filter on stderr instead of warn-and-up only.
    pub verbose: bool,
}

/// Initialize tracing with a daily-rolling file writer and stderr output.
///
/// Returns the appender guard; dropping it flushes buffered log lines, so
/// callers keep it alive for the life of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{}.log", config.app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

/// Drover home directory: `~/.drover` (override with `DROVER_HOME`).
pub fn drover_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("DROVER_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|h| h.join(".drover"))
        .unwrap_or_else(|| PathBuf::from(".drover"))
}

/// Logs directory: `~/.drover/logs`.
pub fn logs_dir() -> PathBuf {
    drover_home().join("logs")
}

/// Default store location: `~/.drover/drover.db`.
pub fn default_db_path() -> PathBuf {
    drover_home().join("drover.db")
}

fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
