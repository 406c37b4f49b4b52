//! Dead-letter sink for submissions the queue writer could not persist
//! within its retry budget.

use chrono::{DateTime, Utc};
use drover_db::{DbPool, Result};
use drover_protocol::JobMessage;
use sqlx::FromRow;
use tracing::warn;

/// A dead-lettered submission envelope, kept for operator replay.
#[derive(Debug, Clone, FromRow)]
pub struct DeadLetter {
    pub id: i64,
    pub job_id: String,
    pub envelope: String,
    pub error: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeadLetterStore {
    pool: DbPool,
}

impl DeadLetterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, message: &JobMessage, error: &str, attempts: u32) -> Result<()> {
        let envelope = serde_json::to_string(message)?;
        sqlx::query(
            r#"
            INSERT INTO dead_letters (job_id, envelope, error, attempts, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.job_id.as_str())
        .bind(&envelope)
        .bind(error)
        .bind(i64::from(attempts))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        warn!(
            "Submission {} dead-lettered after {} attempts: {}",
            message.job_id, attempts, error
        );
        Ok(())
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<DeadLetter>> {
        let rows: Vec<DeadLetter> = sqlx::query_as(
            "SELECT id, job_id, envelope, error, attempts, created_at \
             FROM dead_letters ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
