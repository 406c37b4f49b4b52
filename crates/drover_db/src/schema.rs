//! Schema DDL for the orchestration store.
//!
//! Five tables: jobs, workers, data_quality_issues, job_logs, dead_letters.
//! Claim selection is served by the composite `(status, created_at)` index;
//! reclamation scans use the partial `worker_id` index and the worker
//! `last_heartbeat` index.

use crate::error::Result;
use crate::pool::DbPool;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id          TEXT PRIMARY KEY,
    job_type        TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending','claimed','running','completed','failed','cancelled')),
    worker_id       TEXT,
    config          TEXT NOT NULL,
    checkpoint      TEXT,
    created_at      TEXT NOT NULL,
    claimed_at      TEXT,
    started_at      TEXT,
    completed_at    TEXT,
    updated_at      TEXT NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 3,
    error_message   TEXT,
    CHECK (retry_count <= max_retries)
);
CREATE INDEX IF NOT EXISTS ix_jobs_status_created ON jobs(status, created_at);
CREATE INDEX IF NOT EXISTS ix_jobs_worker ON jobs(worker_id) WHERE worker_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS workers (
    worker_id       TEXT PRIMARY KEY,
    hostname        TEXT,
    ip_address      TEXT,
    capabilities    TEXT NOT NULL DEFAULT '[]',
    status          TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active','idle','offline','error')),
    last_heartbeat  TEXT NOT NULL,
    metadata        TEXT
);
CREATE INDEX IF NOT EXISTS ix_workers_heartbeat ON workers(last_heartbeat);

CREATE TABLE IF NOT EXISTS data_quality_issues (
    issue_id            TEXT PRIMARY KEY,
    job_id              TEXT NOT NULL REFERENCES jobs(job_id),
    source_record_id    TEXT NOT NULL,
    issue_type          TEXT NOT NULL,
    severity            TEXT NOT NULL
                        CHECK (severity IN ('warning','error','critical')),
    field_name          TEXT,
    invalid_value       TEXT,
    expected_format     TEXT,
    message             TEXT,
    raw_record          TEXT,
    resolution_status   TEXT NOT NULL DEFAULT 'pending'
                        CHECK (resolution_status IN ('pending','resolved','ignored','auto_fixed')),
    resolution_action   TEXT,
    resolution_notes    TEXT,
    resolved_by         TEXT,
    resolved_at         TEXT,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_issues_resolution ON data_quality_issues(resolution_status, created_at);
CREATE INDEX IF NOT EXISTS ix_issues_job ON data_quality_issues(job_id);

CREATE TABLE IF NOT EXISTS job_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id      TEXT NOT NULL,
    worker_id   TEXT,
    level       TEXT NOT NULL
                CHECK (level IN ('DEBUG','INFO','WARNING','ERROR','CRITICAL')),
    message     TEXT NOT NULL,
    context     TEXT,
    logged_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_job_logs_job ON job_logs(job_id, id);

CREATE TABLE IF NOT EXISTS dead_letters (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id      TEXT NOT NULL,
    envelope    TEXT NOT NULL,
    error       TEXT NOT NULL,
    attempts    INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

/// Initialize the orchestration schema. Idempotent.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}
