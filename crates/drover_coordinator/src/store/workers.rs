//! Worker registry: heartbeat upserts and liveness queries.

use chrono::{DateTime, Utc};
use drover_db::{DbError, DbPool, Result};
use drover_protocol::{WorkerHeartbeatRequest, WorkerInfo, WorkerLiveness, WorkerStatus};
use serde_json::Value;
use sqlx::FromRow;
use tracing::debug;

#[derive(Debug, Clone, FromRow)]
struct WorkerRow {
    worker_id: String,
    hostname: Option<String>,
    ip_address: Option<String>,
    capabilities: String,
    status: String,
    last_heartbeat: DateTime<Utc>,
    metadata: Option<String>,
}

impl WorkerRow {
    fn into_info(self) -> Result<WorkerInfo> {
        let status: WorkerStatus = self
            .status
            .parse()
            .map_err(|e| DbError::Decode(format!("worker {}: {}", self.worker_id, e)))?;
        let capabilities: Vec<String> = serde_json::from_str(&self.capabilities)?;
        let metadata: Option<Value> = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(WorkerInfo {
            worker_id: self.worker_id,
            hostname: self.hostname,
            ip_address: self.ip_address,
            capabilities,
            status,
            last_heartbeat: self.last_heartbeat,
            metadata,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStore {
    pool: DbPool,
}

impl WorkerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Liveness heartbeat: one idempotent upsert, creating the row on first
    /// contact. Fields the worker did not report keep their stored values;
    /// a heartbeat from a worker previously marked offline brings it back.
    pub async fn heartbeat(&self, request: &WorkerHeartbeatRequest) -> Result<WorkerInfo> {
        if request.worker_id.trim().is_empty() {
            return Err(DbError::precondition("worker_id must not be empty"));
        }

        let status = request.status.unwrap_or(WorkerStatus::Active);
        let capabilities = request
            .capabilities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata = request
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO workers (worker_id, hostname, ip_address, capabilities, status, last_heartbeat, metadata)
            VALUES (?, ?, ?, COALESCE(?, '[]'), ?, ?, ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                hostname = COALESCE(excluded.hostname, workers.hostname),
                ip_address = COALESCE(excluded.ip_address, workers.ip_address),
                capabilities = COALESCE(?, workers.capabilities),
                status = excluded.status,
                last_heartbeat = excluded.last_heartbeat,
                metadata = COALESCE(excluded.metadata, workers.metadata)
            "#,
        )
        .bind(&request.worker_id)
        .bind(&request.hostname)
        .bind(&request.ip_address)
        .bind(&capabilities)
        .bind(status.as_str())
        .bind(now)
        .bind(&metadata)
        .bind(&capabilities)
        .execute(&self.pool)
        .await?;

        debug!("Heartbeat from worker {}", request.worker_id);
        self.get(&request.worker_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("worker {}", request.worker_id)))
    }

    /// Refresh `last_heartbeat` only; used by job-level progress reports.
    /// A row that does not exist yet is left to the full heartbeat path.
    pub async fn touch(&self, worker_id: &str) -> Result<()> {
        sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE worker_id = ?")
            .bind(Utc::now())
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get(&self, worker_id: &str) -> Result<Option<WorkerInfo>> {
        let row: Option<WorkerRow> = sqlx::query_as(
            "SELECT worker_id, hostname, ip_address, capabilities, status, last_heartbeat, metadata \
             FROM workers WHERE worker_id = ?",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(WorkerRow::into_info).transpose()
    }

    /// Owner liveness view for the job detail join.
    pub async fn liveness(&self, worker_id: &str) -> Result<Option<WorkerLiveness>> {
        Ok(self.get(worker_id).await?.map(|info| WorkerLiveness {
            worker_id: info.worker_id,
            status: info.status,
            last_heartbeat: info.last_heartbeat,
        }))
    }

    /// Workers currently considered live (`active` or `idle`).
    pub async fn list_live(&self) -> Result<Vec<WorkerInfo>> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            "SELECT worker_id, hostname, ip_address, capabilities, status, last_heartbeat, metadata \
             FROM workers WHERE status IN ('active', 'idle') ORDER BY worker_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkerRow::into_info).collect()
    }
}
