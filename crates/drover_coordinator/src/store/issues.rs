//! Data-quality issue pipeline: worker-reported findings and their
//! resolution lifecycle.

use chrono::{DateTime, Utc};
use drover_db::{DbError, DbPool, Result};
use drover_ids::JobId;
use drover_protocol::{
    DataQualityIssue, ReportIssueRequest, ResolutionStatus, ResolveIssueRequest, Severity,
};
use serde_json::Value;
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct IssueRow {
    issue_id: String,
    job_id: String,
    source_record_id: String,
    issue_type: String,
    severity: String,
    field_name: Option<String>,
    invalid_value: Option<String>,
    expected_format: Option<String>,
    message: Option<String>,
    raw_record: Option<String>,
    resolution_status: String,
    resolution_action: Option<String>,
    resolution_notes: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const ISSUE_COLUMNS: &str = "issue_id, job_id, source_record_id, issue_type, severity, \
     field_name, invalid_value, expected_format, message, raw_record, \
     resolution_status, resolution_action, resolution_notes, resolved_by, resolved_at, created_at";

impl IssueRow {
    fn into_issue(self) -> Result<DataQualityIssue> {
        let severity: Severity = self
            .severity
            .parse()
            .map_err(|e| DbError::Decode(format!("issue {}: {}", self.issue_id, e)))?;
        let resolution_status: ResolutionStatus = self
            .resolution_status
            .parse()
            .map_err(|e| DbError::Decode(format!("issue {}: {}", self.issue_id, e)))?;
        let raw_record: Option<Value> = self
            .raw_record
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(DataQualityIssue {
            issue_id: self.issue_id,
            job_id: JobId::from_store(self.job_id),
            source_record_id: self.source_record_id,
            issue_type: self.issue_type,
            severity,
            field_name: self.field_name,
            invalid_value: self.invalid_value,
            expected_format: self.expected_format,
            message: self.message,
            raw_record,
            resolution_status,
            resolution_action: self.resolution_action,
            resolution_notes: self.resolution_notes,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssueStore {
    pool: DbPool,
}

impl IssueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a finding against a job; always enters as `pending`.
    pub async fn report(&self, job_id: &str, request: &ReportIssueRequest) -> Result<String> {
        let issue_id = Uuid::new_v4().to_string();
        let raw_record = request
            .raw_record
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO data_quality_issues
                (issue_id, job_id, source_record_id, issue_type, severity,
                 field_name, invalid_value, expected_format, message, raw_record,
                 resolution_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&issue_id)
        .bind(job_id)
        .bind(&request.source_record_id)
        .bind(&request.issue_type)
        .bind(request.severity.as_str())
        .bind(&request.field_name)
        .bind(&request.invalid_value)
        .bind(&request.expected_format)
        .bind(&request.message)
        .bind(&raw_record)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(
            "DQ issue {} ({}) reported on job {}",
            issue_id, request.issue_type, job_id
        );
        Ok(issue_id)
    }

    /// List issues, newest first, optionally filtered by resolution status.
    pub async fn list(
        &self,
        status: Option<ResolutionStatus>,
        limit: u32,
    ) -> Result<Vec<DataQualityIssue>> {
        let rows: Vec<IssueRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {ISSUE_COLUMNS} FROM data_quality_issues \
                     WHERE resolution_status = ? ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {ISSUE_COLUMNS} FROM data_quality_issues \
                     ORDER BY created_at DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(IssueRow::into_issue).collect()
    }

    /// Resolve a pending issue. `resolved_at` is set iff the issue leaves
    /// `pending`, so resolution is single-shot: a second attempt conflicts.
    pub async fn resolve(&self, issue_id: &str, request: &ResolveIssueRequest) -> Result<()> {
        if request.resolution_status == ResolutionStatus::Pending {
            return Err(DbError::precondition(
                "resolution_status must not be 'pending'",
            ));
        }

        let affected = sqlx::query(
            r#"
            UPDATE data_quality_issues
            SET resolution_status = ?, resolution_action = ?, resolution_notes = ?,
                resolved_by = ?, resolved_at = ?
            WHERE issue_id = ? AND resolution_status = 'pending'
            "#,
        )
        .bind(request.resolution_status.as_str())
        .bind(&request.resolution_action)
        .bind(&request.resolution_notes)
        .bind(&request.resolved_by)
        .bind(Utc::now())
        .bind(issue_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT resolution_status FROM data_quality_issues WHERE issue_id = ?")
                    .bind(issue_id)
                    .fetch_optional(&self.pool)
                    .await?;
            return match exists {
                None => Err(DbError::not_found(format!("issue {issue_id}"))),
                Some((status,)) => Err(DbError::conflict(format!(
                    "issue {issue_id} is already {status}"
                ))),
            };
        }

        info!(
            "DQ issue {} resolved as {}",
            issue_id,
            request.resolution_status.as_str()
        );
        Ok(())
    }
}
