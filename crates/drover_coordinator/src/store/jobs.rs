//! Job persistence and the claim engine.
//!
//! Claiming uses the conditional-update protocol: select the oldest eligible
//! pending job, then `UPDATE ... WHERE job_id = ? AND status = 'pending'`.
//! Exactly one concurrent claimer sees a nonzero row count; the losers
//! re-select. Every lifecycle mutation guards its UPDATE with the source
//! states rendered by [`super::transition_sources`], so the graph in
//! `drover_protocol` is the single encoding of what is legal. Terminal rows
//! keep the last `worker_id` for audit; the re-pending paths
//! (worker-reported failure with budget, abandonment) clear ownership so
//! the job returns to the pool.

use super::transition_sources;
use chrono::{DateTime, Utc};
use drover_db::{DbError, DbPool, Result};
use drover_ids::JobId;
use drover_protocol::{Job, JobMessage, JobStatus};
use serde_json::Value;
use sqlx::FromRow;
use tracing::{debug, info};

/// Re-selection attempts before a claim request reports "no work".
const CLAIM_ATTEMPTS: usize = 8;

const JOB_COLUMNS: &str = "job_id, job_type, status, worker_id, config, checkpoint, \
     created_at, claimed_at, started_at, completed_at, updated_at, \
     retry_count, max_retries, error_message";

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    job_id: String,
    job_type: String,
    status: String,
    worker_id: Option<String>,
    config: String,
    checkpoint: Option<String>,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    retry_count: i64,
    max_retries: i64,
    error_message: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e| DbError::Decode(format!("job {}: {}", self.job_id, e)))?;
        let config: Value = serde_json::from_str(&self.config)?;
        let checkpoint = self
            .checkpoint
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Job {
            job_id: JobId::from_store(self.job_id),
            job_type: self.job_type,
            status,
            worker_id: self.worker_id,
            config,
            checkpoint,
            created_at: self.created_at,
            claimed_at: self.claimed_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            error_message: self.error_message,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    pool: DbPool,
}

impl JobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Durably insert a submission; "insert if absent, otherwise do nothing".
    ///
    /// Returns `false` when the row already existed, which acknowledges a
    /// replay under at-least-once delivery without error.
    pub async fn insert_if_absent(&self, message: &JobMessage) -> Result<bool> {
        let config = serde_json::to_string(&message.config)?;
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, job_type, status, config, created_at, updated_at, retry_count, max_retries)
            VALUES (?, ?, 'pending', ?, ?, ?, 0, ?)
            ON CONFLICT(job_id) DO NOTHING
            "#,
        )
        .bind(message.job_id.as_str())
        .bind(&message.job_type)
        .bind(&config)
        .bind(message.created_at)
        .bind(message.created_at)
        .bind(i64::from(message.max_retries))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the next eligible pending job for a worker.
    ///
    /// FIFO within the capability set by `created_at`, ties broken by
    /// `job_id`. A lost race (zero rows affected by the conditional update)
    /// re-selects; after [`CLAIM_ATTEMPTS`] losses the request reports no
    /// work and the worker retries cleanly.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        capabilities: &[String],
    ) -> Result<Option<Job>> {
        if capabilities.is_empty() {
            return Ok(None);
        }

        let claimable = transition_sources(JobStatus::Claimed);
        let placeholders = vec!["?"; capabilities.len()].join(", ");
        let select_sql = format!(
            "SELECT job_id FROM jobs \
             WHERE status IN ({claimable}) AND job_type IN ({placeholders}) \
             ORDER BY created_at, job_id LIMIT 1"
        );
        let update_sql = format!(
            "UPDATE jobs \
             SET status = 'claimed', worker_id = ?, claimed_at = ?, updated_at = ? \
             WHERE job_id = ? AND status IN ({claimable})"
        );

        for _ in 0..CLAIM_ATTEMPTS {
            let mut tx = self.pool.begin().await?;

            let mut select = sqlx::query_scalar::<_, String>(&select_sql);
            for capability in capabilities {
                select = select.bind(capability);
            }
            let Some(job_id) = select.fetch_optional(&mut *tx).await? else {
                tx.commit().await?;
                return Ok(None);
            };

            let now = Utc::now();
            let claimed = sqlx::query(&update_sql)
                .bind(worker_id)
                .bind(now)
                .bind(now)
                .bind(&job_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if claimed == 0 {
                // Another claimer won this row; re-select.
                tx.commit().await?;
                continue;
            }

            let row: JobRow =
                sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?"))
                    .bind(&job_id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.commit().await?;

            info!("Job {} claimed by worker {}", job_id, worker_id);
            return Ok(Some(row.into_job()?));
        }

        debug!(
            "Worker {} lost {} claim races, reporting no work",
            worker_id, CLAIM_ATTEMPTS
        );
        Ok(None)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// List jobs, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at DESC, job_id DESC LIMIT ?"
                ))
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, job_id DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Worker reports it began processing: `claimed -> running`.
    pub async fn start(&self, job_id: &str, worker_id: &str) -> Result<JobStatus> {
        let now = Utc::now();
        let affected = sqlx::query(&format!(
            "UPDATE jobs \
             SET status = 'running', started_at = ?, updated_at = ? \
             WHERE job_id = ? AND worker_id = ? AND status IN ({})",
            transition_sources(JobStatus::Running)
        ))
        .bind(now)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(self.ownership_failure(job_id, worker_id, "start").await?);
        }
        Ok(JobStatus::Running)
    }

    /// Overwrite the job's opaque checkpoint; owner-only, last write wins.
    /// Not a lifecycle edge: the status guard is the set of owned states,
    /// not a transition source list.
    pub async fn checkpoint(&self, job_id: &str, worker_id: &str, checkpoint: &Value) -> Result<()> {
        let encoded = serde_json::to_string(checkpoint)?;
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET checkpoint = ?, updated_at = ?
            WHERE job_id = ? AND worker_id = ? AND status IN ('claimed', 'running')
            "#,
        )
        .bind(&encoded)
        .bind(Utc::now())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(self.ownership_failure(job_id, worker_id, "checkpoint").await?);
        }
        Ok(())
    }

    /// Job-level progress heartbeat.
    ///
    /// Returns the job's current status so the owner of a cancelled job
    /// observes the transition and self-terminates. Reports on jobs owned by
    /// someone else, or already moved to a terminal state by recovery, are
    /// precondition failures and the caller discards its state.
    pub async fn heartbeat(&self, job_id: &str, worker_id: &str) -> Result<JobStatus> {
        let job = self
            .get(job_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("job {job_id}")))?;

        match job.status {
            JobStatus::Cancelled => Ok(JobStatus::Cancelled),
            JobStatus::Claimed | JobStatus::Running
                if job.worker_id.as_deref() == Some(worker_id) =>
            {
                sqlx::query("UPDATE jobs SET updated_at = ? WHERE job_id = ?")
                    .bind(Utc::now())
                    .bind(job_id)
                    .execute(&self.pool)
                    .await?;
                Ok(job.status)
            }
            _ => Err(DbError::precondition(format!(
                "job {job_id} is {} and not owned by worker {worker_id}",
                job.status
            ))),
        }
    }

    /// Terminal success: `running -> completed`. Ownership is released but
    /// the worker that ran the job stays on the record for audit.
    pub async fn complete(&self, job_id: &str, worker_id: &str) -> Result<JobStatus> {
        let now = Utc::now();
        let affected = sqlx::query(&format!(
            "UPDATE jobs \
             SET status = 'completed', completed_at = ?, updated_at = ? \
             WHERE job_id = ? AND worker_id = ? AND status IN ({})",
            transition_sources(JobStatus::Completed)
        ))
        .bind(now)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(self.ownership_failure(job_id, worker_id, "complete").await?);
        }
        info!("Job {} completed by worker {}", job_id, worker_id);
        Ok(JobStatus::Completed)
    }

    /// Worker-reported failure, applying the retry policy: back to `pending`
    /// with an incremented counter while budget remains, terminal `failed`
    /// once exhausted.
    pub async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error_message: &str,
    ) -> Result<JobStatus> {
        let mut tx = self.pool.begin().await?;

        // A reported failure lands on `pending` or `failed` depending on the
        // budget; both targets share the same source states in the graph.
        let budget: Option<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT retry_count, max_retries FROM jobs \
             WHERE job_id = ? AND worker_id = ? AND status IN ({})",
            transition_sources(JobStatus::Failed)
        ))
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((retry_count, max_retries)) = budget else {
            tx.commit().await?;
            return Err(self.ownership_failure(job_id, worker_id, "fail").await?);
        };

        let now = Utc::now();
        let status = if retry_count < max_retries {
            sqlx::query(&format!(
                "UPDATE jobs \
                 SET status = 'pending', worker_id = NULL, claimed_at = NULL, started_at = NULL, \
                     retry_count = retry_count + 1, error_message = ?, updated_at = ? \
                 WHERE job_id = ? AND worker_id = ? AND status IN ({})",
                transition_sources(JobStatus::Pending)
            ))
            .bind(error_message)
            .bind(now)
            .bind(job_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
            JobStatus::Pending
        } else {
            sqlx::query(&format!(
                "UPDATE jobs \
                 SET status = 'failed', completed_at = ?, error_message = ?, updated_at = ? \
                 WHERE job_id = ? AND worker_id = ? AND status IN ({})",
                transition_sources(JobStatus::Failed)
            ))
            .bind(now)
            .bind(error_message)
            .bind(now)
            .bind(job_id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
            JobStatus::Failed
        };

        tx.commit().await?;
        info!(
            "Job {} failed by worker {} -> {} ({})",
            job_id, worker_id, status, error_message
        );
        Ok(status)
    }

    /// Admin cancellation of any non-terminal state.
    pub async fn cancel(&self, job_id: &str, reason: Option<&str>) -> Result<JobStatus> {
        let now = Utc::now();
        let affected = sqlx::query(&format!(
            "UPDATE jobs \
             SET status = 'cancelled', completed_at = ?, \
                 error_message = COALESCE(?, error_message), updated_at = ? \
             WHERE job_id = ? AND status IN ({})",
            transition_sources(JobStatus::Cancelled)
        ))
        .bind(now)
        .bind(reason)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return match self.get(job_id).await? {
                None => Err(DbError::not_found(format!("job {job_id}"))),
                Some(job) => Err(DbError::conflict(format!(
                    "job {job_id} is already {}",
                    job.status
                ))),
            };
        }
        info!("Job {} cancelled", job_id);
        Ok(JobStatus::Cancelled)
    }

    /// Distinguish "unknown job" from "not yours / wrong state" after a
    /// conditional update matched nothing.
    async fn ownership_failure(
        &self,
        job_id: &str,
        worker_id: &str,
        operation: &str,
    ) -> Result<DbError> {
        Ok(match self.get(job_id).await? {
            None => DbError::not_found(format!("job {job_id}")),
            Some(job) => DbError::precondition(format!(
                "cannot {operation} job {job_id}: status is {}, owner is {}, caller is {worker_id}",
                job.status,
                job.worker_id.as_deref().unwrap_or("none"),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_db::{create_pool, init_schema, DbConfig};
    use serde_json::json;

    async fn store() -> JobStore {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        init_schema(&pool).await.unwrap();
        JobStore::new(pool)
    }

    fn message(job_type: &str, max_retries: u32) -> JobMessage {
        JobMessage {
            job_id: JobId::generate(),
            job_type: job_type.to_string(),
            config: json!({"k": 1}),
            max_retries,
            created_at: Utc::now(),
        }
    }

    async fn submit(store: &JobStore, job_type: &str, max_retries: u32) -> JobId {
        let msg = message(job_type, max_retries);
        assert!(store.insert_if_absent(&msg).await.unwrap());
        msg.job_id
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let store = store().await;
        let msg = message("x", 3);
        assert!(store.insert_if_absent(&msg).await.unwrap());
        assert!(!store.insert_if_absent(&msg).await.unwrap());

        let jobs = store.list(None, 100).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn claim_matches_capabilities_fifo() {
        let store = store().await;
        let first = submit(&store, "x", 3).await;
        let second = submit(&store, "x", 3).await;
        submit(&store, "z", 3).await;

        // No eligible type.
        assert!(store
            .claim_next("w1", &["y".to_string()])
            .await
            .unwrap()
            .is_none());

        // FIFO within the eligible set.
        let claimed = store
            .claim_next("w1", &["x".to_string(), "y".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job_id, first);
        assert_eq!(claimed.status, JobStatus::Claimed);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));
        assert!(claimed.claimed_at.is_some());

        let claimed = store
            .claim_next("w2", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job_id, second);
    }

    #[tokio::test]
    async fn claim_with_no_capabilities_is_no_work() {
        let store = store().await;
        submit(&store, "x", 3).await;
        assert!(store.claim_next("w1", &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claimed_job_is_not_claimable_again() {
        let store = store().await;
        submit(&store, "x", 3).await;
        let caps = vec!["x".to_string()];
        assert!(store.claim_next("w1", &caps).await.unwrap().is_some());
        assert!(store.claim_next("w2", &caps).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lifecycle_happy_path() {
        let store = store().await;
        let job_id = submit(&store, "x", 3).await;
        let caps = vec!["x".to_string()];
        store.claim_next("w1", &caps).await.unwrap().unwrap();

        store.start(job_id.as_str(), "w1").await.unwrap();
        store
            .checkpoint(job_id.as_str(), "w1", &json!({"n": 100}))
            .await
            .unwrap();
        store.complete(job_id.as_str(), "w1").await.unwrap();

        let job = store.get(job_id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.checkpoint, Some(json!({"n": 100})));
        assert_eq!(job.worker_id.as_deref(), Some("w1"));
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn start_requires_claimed_state() {
        let store = store().await;
        let job_id = submit(&store, "x", 3).await;
        // pending -> running must pass through claimed
        let err = store.start(job_id.as_str(), "w1").await.unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
    }

    #[tokio::test]
    async fn non_owner_reports_are_rejected() {
        let store = store().await;
        let job_id = submit(&store, "x", 3).await;
        store
            .claim_next("w1", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();

        let err = store.start(job_id.as_str(), "w2").await.unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
        let err = store
            .checkpoint(job_id.as_str(), "w2", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = store().await;
        let err = store.start("0000000000AAAAAAAAAAAAAAAA", "w1").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn fail_with_budget_returns_to_pending() {
        let store = store().await;
        let job_id = submit(&store, "x", 1).await;
        store
            .claim_next("w1", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();
        store.start(job_id.as_str(), "w1").await.unwrap();

        let status = store
            .fail(job_id.as_str(), "w1", "source unreachable")
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Pending);

        let job = store.get(job_id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.retry_count, 1);
        assert!(job.worker_id.is_none());
        assert!(job.claimed_at.is_none());
        assert!(job.started_at.is_none());
        assert_eq!(job.error_message.as_deref(), Some("source unreachable"));

        // Budget exhausted on the second failure.
        store
            .claim_next("w2", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();
        store.start(job_id.as_str(), "w2").await.unwrap();
        let status = store
            .fail(job_id.as_str(), "w2", "still unreachable")
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Failed);

        let job = store.get(job_id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn complete_after_recovery_failure_is_rejected() {
        let store = store().await;
        let job_id = submit(&store, "x", 0).await;
        store
            .claim_next("w1", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();
        store.start(job_id.as_str(), "w1").await.unwrap();
        store.fail(job_id.as_str(), "w1", "boom").await.unwrap();

        // The job is terminal failed; a late completion must be discarded.
        let err = store.complete(job_id.as_str(), "w1").await.unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
    }

    #[tokio::test]
    async fn cancel_propagates_through_heartbeat() {
        let store = store().await;
        let job_id = submit(&store, "x", 3).await;
        store
            .claim_next("w1", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store.heartbeat(job_id.as_str(), "w1").await.unwrap(),
            JobStatus::Claimed
        );

        store.cancel(job_id.as_str(), Some("superseded")).await.unwrap();
        assert_eq!(
            store.heartbeat(job_id.as_str(), "w1").await.unwrap(),
            JobStatus::Cancelled
        );

        // Cancel is terminal: a second cancel conflicts.
        let err = store.cancel(job_id.as_str(), None).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn config_round_trips_unparsed() {
        let store = store().await;
        let config = json!({"paths": ["/a", "/b"], "nested": {"depth": 2, "flag": true}});
        let msg = JobMessage {
            job_id: JobId::generate(),
            job_type: "x".to_string(),
            config: config.clone(),
            max_retries: 3,
            created_at: Utc::now(),
        };
        store.insert_if_absent(&msg).await.unwrap();
        let job = store.get(msg.job_id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.config, config);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = store().await;
        submit(&store, "x", 3).await;
        submit(&store, "x", 3).await;
        store
            .claim_next("w1", &["x".to_string()])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store
                .list(Some(JobStatus::Pending), 100)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list(Some(JobStatus::Claimed), 100)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.list(None, 100).await.unwrap().len(), 2);
        assert_eq!(store.list(None, 1).await.unwrap().len(), 1);
    }
}
