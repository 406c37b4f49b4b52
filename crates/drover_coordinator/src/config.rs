//! Coordinator configuration.
//!
//! Everything is settable by flag or `DROVER_*` environment variable and has
//! a default; nothing here is a secret.

use anyhow::{bail, Result};
use clap::Parser;
use drover_protocol::defaults;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "drover-coordinator",
    about = "Drover coordinator: queues, claims, and recovers data-ingestion jobs"
)]
pub struct CoordinatorConfig {
    /// HTTP bind address
    #[arg(long, env = "DROVER_BIND", default_value = "127.0.0.1:7450")]
    pub bind: String,

    /// Store connection string (defaults to sqlite under the Drover home dir)
    #[arg(long, env = "DROVER_DATABASE_URL")]
    pub database: Option<String>,

    /// Seconds without a heartbeat before a worker is considered stale
    #[arg(long, env = "DROVER_STALE_THRESHOLD_SECS", default_value_t = defaults::STALE_THRESHOLD_SECS)]
    pub stale_threshold_secs: u64,

    /// Seconds between liveness/recovery passes
    #[arg(long, env = "DROVER_RECLAIM_INTERVAL_SECS", default_value_t = defaults::RECLAIM_INTERVAL_SECS)]
    pub reclaim_interval_secs: u64,

    /// Capacity of the submission hand-off buffer
    #[arg(long, env = "DROVER_SUBMIT_QUEUE_DEPTH", default_value_t = defaults::SUBMIT_QUEUE_DEPTH)]
    pub submit_queue_depth: usize,

    /// Store-write attempts per submission before dead-lettering
    #[arg(long, env = "DROVER_WRITER_RETRY_BUDGET", default_value_t = defaults::WRITER_RETRY_BUDGET)]
    pub writer_retry_budget: u32,

    /// Retry budget for jobs whose submitter did not set one
    #[arg(long, env = "DROVER_DEFAULT_MAX_RETRIES", default_value_t = defaults::JOB_MAX_RETRIES)]
    pub default_max_retries: u32,

    /// Mirror the file-level log filter on stderr
    #[arg(long)]
    pub verbose: bool,
}

impl CoordinatorConfig {
    /// Reject configurations the recovery model cannot honor.
    ///
    /// The reclamation cadence must undercut half the stale threshold so a
    /// worker is observed stale within one threshold of going silent.
    pub fn validate(&self) -> Result<()> {
        if self.stale_threshold_secs == 0 {
            bail!("stale threshold must be positive");
        }
        if self.reclaim_interval_secs == 0 {
            bail!("reclaim interval must be positive");
        }
        if self.reclaim_interval_secs >= self.stale_threshold_secs / 2 {
            bail!(
                "reclaim interval ({}s) must be less than half the stale threshold ({}s)",
                self.reclaim_interval_secs,
                self.stale_threshold_secs
            );
        }
        if self.submit_queue_depth == 0 {
            bail!("submit queue depth must be positive");
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        self.database.clone().unwrap_or_else(|| {
            format!(
                "sqlite:{}?mode=rwc",
                drover_logging::default_db_path().display()
            )
        })
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }
}
