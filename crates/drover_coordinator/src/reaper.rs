//! Liveness and recovery loop.
//!
//! A single-writer periodic task. Each pass runs one transaction with two
//! ordered steps: (1) workers silent beyond the stale threshold are marked
//! offline, (2) every claimed/running job owned by an offline worker is
//! abandoned under the retry policy. Running both steps inside the same
//! transaction gives the second step a consistent snapshot of the first.
//! Cancelled jobs are never reclaimed; their owner observes the transition
//! on its next progress report.

use chrono::Utc;
use drover_db::{DbPool, Result};
use drover_protocol::JobStatus;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::store::transition_sources;

/// Message recorded on jobs abandoned because their owner went silent.
const UNRESPONSIVE_MESSAGE: &str = "worker became unresponsive";

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub workers_offlined: u64,
    pub jobs_requeued: u64,
    pub jobs_failed: u64,
}

pub struct ReclamationLoop {
    pool: DbPool,
    stale_threshold: Duration,
    interval: Duration,
}

impl ReclamationLoop {
    pub fn new(pool: DbPool, stale_threshold: Duration, interval: Duration) -> Self {
        Self {
            pool,
            stale_threshold,
            interval,
        }
    }

    /// Tick forever. A failed pass is logged and retried on the next tick.
    pub async fn run(self) {
        info!(
            "Reclamation loop started (interval {:?}, stale threshold {:?})",
            self.interval, self.stale_threshold
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh coordinator
        // does not reclaim before workers had one interval to heartbeat.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.pass().await {
                warn!("Reclamation pass failed, retrying next tick: {}", err);
            }
        }
    }

    /// One recovery pass: mark stale workers offline, then abandon their
    /// jobs. Re-enqueue while retry budget remains, terminal `failed` once
    /// exhausted.
    pub async fn pass(&self) -> Result<PassSummary> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(self.stale_threshold)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));

        let mut tx = self.pool.begin().await?;

        let workers_offlined = sqlx::query(
            r#"
            UPDATE workers SET status = 'offline'
            WHERE status IN ('active', 'idle') AND last_heartbeat < ?
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Abandonment targets `pending` or `failed`; both share the same
        // source states in the canonical graph, which also bounds this scan.
        let orphans: Vec<(String, i64, i64)> = sqlx::query_as(&format!(
            "SELECT j.job_id, j.retry_count, j.max_retries \
             FROM jobs j JOIN workers w ON j.worker_id = w.worker_id \
             WHERE j.status IN ({}) AND w.status = 'offline'",
            transition_sources(JobStatus::Pending)
        ))
        .fetch_all(&mut *tx)
        .await?;

        let mut jobs_requeued = 0;
        let mut jobs_failed = 0;
        for (job_id, retry_count, max_retries) in &orphans {
            if retry_count < max_retries {
                sqlx::query(&format!(
                    "UPDATE jobs \
                     SET status = 'pending', worker_id = NULL, claimed_at = NULL, started_at = NULL, \
                         retry_count = retry_count + 1, error_message = ?, updated_at = ? \
                     WHERE job_id = ? AND status IN ({})",
                    transition_sources(JobStatus::Pending)
                ))
                .bind(UNRESPONSIVE_MESSAGE)
                .bind(now)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
                jobs_requeued += 1;
                warn!("Job {} abandoned by unresponsive worker, re-enqueued", job_id);
            } else {
                sqlx::query(&format!(
                    "UPDATE jobs \
                     SET status = 'failed', completed_at = ?, error_message = ?, updated_at = ? \
                     WHERE job_id = ? AND status IN ({})",
                    transition_sources(JobStatus::Failed)
                ))
                .bind(now)
                .bind(UNRESPONSIVE_MESSAGE)
                .bind(now)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
                jobs_failed += 1;
                warn!("Job {} abandoned with retry budget exhausted, failed", job_id);
            }
        }

        tx.commit().await?;

        let summary = PassSummary {
            workers_offlined,
            jobs_requeued,
            jobs_failed,
        };
        if summary != PassSummary::default() {
            info!(
                "Reclamation pass: {} workers offlined, {} jobs re-enqueued, {} jobs failed",
                summary.workers_offlined, summary.jobs_requeued, summary.jobs_failed
            );
        } else {
            debug!("Reclamation pass: nothing to do");
        }
        Ok(summary)
    }
}
