//! HTTP request/response bodies for the coordinator API.
//!
//! All types use serde with strict enum tagging. Opaque blobs (`config`,
//! `checkpoint`, `metadata`, `raw_record`, log `context`) are
//! `serde_json::Value` and round-trip untouched.

use chrono::{DateTime, Utc};
use drover_ids::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{JobStatus, LogLevel, ResolutionStatus, Severity, WorkerStatus};

// ============================================================================
// Submission (C1)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub job_type: String,
    /// Opaque submitter payload; `null` when omitted.
    #[serde(default)]
    pub config: Value,
    /// Retry budget override; the coordinator default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    /// Always `"queued"`: accepted into the hand-off, not yet persisted.
    pub status: String,
}

// ============================================================================
// Claim (C3)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    /// Job types this worker will accept.
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Advisory record of the `pending -> claimed` transition the server has
/// already executed on the claimer's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub job_id: JobId,
    pub job_type: String,
    pub config: Value,
    /// Present when the job was reclaimed and carries resume state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub transition: ClaimTransition,
}

// ============================================================================
// Worker progress reports (C5)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatResponse {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHeartbeatRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRequest {
    pub worker_id: String,
    /// Opaque resume state; overwrites the previous checkpoint.
    pub checkpoint: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailJobRequest {
    pub worker_id: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Returned by every job-state operation so the caller observes the
/// resulting status (a worker seeing `cancelled` must self-terminate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogRequest {
    pub worker_id: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIssueRequest {
    pub source_record_id: String,
    pub issue_type: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_record: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportIssueResponse {
    pub issue_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIssueRequest {
    /// Target state; must not be `pending`.
    pub resolution_status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

// ============================================================================
// Read surface
// ============================================================================

/// Full job record as exposed by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub config: Value,
    pub checkpoint: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
}

/// Registered worker as exposed by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub capabilities: Vec<String>,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Owner liveness view joined into the job detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLiveness {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetailResponse {
    pub job: Job,
    /// Liveness of the worker recorded on the job, when one is recorded.
    pub worker: Option<WorkerLiveness>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListWorkersResponse {
    pub workers: Vec<WorkerInfo>,
    pub count: usize,
}

/// Data-quality finding as exposed by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub issue_id: String,
    pub job_id: JobId,
    pub source_record_id: String,
    pub issue_type: String,
    pub severity: Severity,
    pub field_name: Option<String>,
    pub invalid_value: Option<String>,
    pub expected_format: Option<String>,
    pub message: Option<String>,
    pub raw_record: Option<Value>,
    pub resolution_status: ResolutionStatus,
    pub resolution_action: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Stored worker log line as exposed by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: i64,
    pub job_id: String,
    pub worker_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub context: Option<Value>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLogsResponse {
    pub logs: Vec<JobLogEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListIssuesResponse {
    pub issues: Vec<DataQualityIssue>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Uniform error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable kind: `invalid_argument`, `not_found`,
    /// `precondition_failed`, `conflict`, `resource_exhausted`, `internal`.
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_config_defaults_to_null() {
        let req: SubmitJobRequest = serde_json::from_str(r#"{"job_type":"x"}"#).unwrap();
        assert_eq!(req.job_type, "x");
        assert!(req.config.is_null());
        assert!(req.max_retries.is_none());
    }

    #[test]
    fn claim_response_round_trips_opaque_config() {
        let config = serde_json::json!({"path": "/data/in.csv", "nested": {"k": [1, 2]}});
        let resp = ClaimResponse {
            job_id: JobId::generate(),
            job_type: "csv_ingest".into(),
            config: config.clone(),
            checkpoint: None,
            created_at: Utc::now(),
            retry_count: 0,
            transition: ClaimTransition {
                from: JobStatus::Pending,
                to: JobStatus::Claimed,
                worker_id: "w1".into(),
                claimed_at: Utc::now(),
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: ClaimResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.config, config);
        assert_eq!(back.transition.to, JobStatus::Claimed);
    }

    #[test]
    fn error_envelope_shape() {
        let err = ErrorResponse {
            error: "precondition_failed".into(),
            message: "job is owned by another worker".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "precondition_failed");
    }
}
