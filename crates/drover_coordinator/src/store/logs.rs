//! Append-only worker execution logs.
//!
//! Stored verbatim for audit; the coordinator never inspects them for
//! decisions.

use chrono::{DateTime, Utc};
use drover_db::{DbError, DbPool, Result};
use drover_protocol::{AppendLogRequest, JobLogEntry, LogLevel};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
struct LogRow {
    id: i64,
    job_id: String,
    worker_id: Option<String>,
    level: String,
    message: String,
    context: Option<String>,
    logged_at: DateTime<Utc>,
}

impl LogRow {
    fn into_entry(self) -> Result<JobLogEntry> {
        let level: LogLevel = self
            .level
            .parse()
            .map_err(|e| DbError::Decode(format!("log {}: {}", self.id, e)))?;
        let context: Option<Value> = self
            .context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(JobLogEntry {
            id: self.id,
            job_id: self.job_id,
            worker_id: self.worker_id,
            level,
            message: self.message,
            context,
            logged_at: self.logged_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogStore {
    pool: DbPool,
}

impl LogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one log line. A single insert so the worker path never waits
    /// on anything but the store.
    pub async fn append(&self, job_id: &str, request: &AppendLogRequest) -> Result<()> {
        let context = request
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO job_logs (job_id, worker_id, level, message, context, logged_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(&request.worker_id)
        .bind(request.level.as_str())
        .bind(&request.message)
        .bind(&context)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Log lines for one job in insertion order.
    pub async fn list_for_job(&self, job_id: &str, limit: u32) -> Result<Vec<JobLogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, job_id, worker_id, level, message, context, logged_at \
             FROM job_logs WHERE job_id = ? ORDER BY id LIMIT ?",
        )
        .bind(job_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::into_entry).collect()
    }
}
