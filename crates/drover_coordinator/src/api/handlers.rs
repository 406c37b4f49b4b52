//! Request handlers for the coordinator API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use drover_protocol::{
    AppendLogRequest, CancelJobRequest, CheckpointRequest, ClaimRequest, ClaimResponse,
    ClaimTransition, CompleteJobRequest, FailJobRequest, HealthResponse, JobDetailResponse,
    JobHeartbeatRequest, JobStatus, JobStatusResponse, ListIssuesResponse, ListJobsResponse,
    ListLogsResponse, ListWorkersResponse, ReportIssueRequest, ReportIssueResponse,
    ResolutionStatus, ResolveIssueRequest, StartJobRequest, SubmitJobRequest, SubmitJobResponse,
    WorkerHeartbeatRequest, WorkerHeartbeatResponse,
};
use serde::Deserialize;
use tracing::warn;

use super::error::{ApiError, ApiResult};
use super::AppState;

const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1_000;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<u32>,
}

impl ListQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

/// Accept a submission into the hand-off; 202 means "queued", not
/// "persisted". Submitters confirm persistence via `/jobs/:id/status`.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let response = state.submissions.submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Claim the next eligible job. The server executes the `pending -> claimed`
/// transition; the response's `transition` field is advisory. A claim that
/// cannot be confirmed against the store reports "no work" so the worker
/// retries cleanly.
pub async fn claim_job(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<Response> {
    if request.worker_id.trim().is_empty() {
        return Err(ApiError::InvalidArgument(
            "worker_id must not be empty".into(),
        ));
    }

    // A claim request implicitly heartbeats the worker with its advertised
    // capabilities.
    state
        .workers
        .heartbeat(&WorkerHeartbeatRequest {
            worker_id: request.worker_id.clone(),
            hostname: request.hostname.clone(),
            ip_address: request.ip_address.clone(),
            capabilities: Some(request.capabilities.clone()),
            status: None,
            metadata: request.metadata.clone(),
        })
        .await?;

    let claimed = match state
        .jobs
        .claim_next(&request.worker_id, &request.capabilities)
        .await
    {
        Ok(claimed) => claimed,
        Err(err) => {
            warn!(
                "Claim for worker {} could not be confirmed, reporting no work: {}",
                request.worker_id, err
            );
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
    };

    match claimed {
        None => Ok(StatusCode::NO_CONTENT.into_response()),
        Some(job) => {
            let claimed_at = job.claimed_at.unwrap_or_else(Utc::now);
            let response = ClaimResponse {
                job_id: job.job_id,
                job_type: job.job_type,
                config: job.config,
                checkpoint: job.checkpoint,
                created_at: job.created_at,
                retry_count: job.retry_count,
                transition: ClaimTransition {
                    from: JobStatus::Pending,
                    to: JobStatus::Claimed,
                    worker_id: request.worker_id,
                    claimed_at,
                },
            };
            Ok((StatusCode::OK, Json(response)).into_response())
        }
    }
}

/// Job detail joined with the recorded worker's liveness view.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobDetailResponse>> {
    let job = state
        .jobs
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    let worker = match job.worker_id.as_deref() {
        Some(worker_id) => state.workers.liveness(worker_id).await?,
        None => None,
    };

    Ok(Json(JobDetailResponse { job, worker }))
}

/// Job-level progress heartbeat. Returns the job's current status; a worker
/// seeing `cancelled` must self-terminate.
pub async fn job_heartbeat(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<JobHeartbeatRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.jobs.heartbeat(&job_id, &request.worker_id).await?;
    state.workers.touch(&request.worker_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

pub async fn start_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<StartJobRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.jobs.start(&job_id, &request.worker_id).await?;
    state.workers.touch(&request.worker_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

pub async fn checkpoint_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<CheckpointRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    state
        .jobs
        .checkpoint(&job_id, &request.worker_id, &request.checkpoint)
        .await?;
    state.workers.touch(&request.worker_id).await?;
    let status = state.jobs.heartbeat(&job_id, &request.worker_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

pub async fn complete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<CompleteJobRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.jobs.complete(&job_id, &request.worker_id).await?;
    state.workers.touch(&request.worker_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

/// Worker-reported failure; the response status tells the worker whether the
/// job went back to `pending` or is terminally `failed`.
pub async fn fail_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<FailJobRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state
        .jobs
        .fail(&job_id, &request.worker_id, &request.error_message)
        .await?;
    state.workers.touch(&request.worker_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

/// Admin cancellation. The owning worker, if any, observes the transition on
/// its next progress report.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<CancelJobRequest>,
) -> ApiResult<Json<JobStatusResponse>> {
    let status = state.jobs.cancel(&job_id, request.reason.as_deref()).await?;
    Ok(Json(JobStatusResponse {
        job_id: parse_job_id(&job_id)?,
        status,
    }))
}

pub async fn append_log(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<AppendLogRequest>,
) -> ApiResult<StatusCode> {
    ensure_job_exists(&state, &job_id).await?;
    state.logs.append(&job_id, &request).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListLogsResponse>> {
    ensure_job_exists(&state, &job_id).await?;
    let logs = state.logs.list_for_job(&job_id, query.limit()).await?;
    let count = logs.len();
    Ok(Json(ListLogsResponse { logs, count }))
}

pub async fn report_issue(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<ReportIssueRequest>,
) -> ApiResult<(StatusCode, Json<ReportIssueResponse>)> {
    ensure_job_exists(&state, &job_id).await?;
    let issue_id = state.issues.report(&job_id, &request).await?;
    Ok((StatusCode::CREATED, Json(ReportIssueResponse { issue_id })))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

    let jobs = state.jobs.list(status, query.limit()).await?;
    let count = jobs.len();
    Ok(Json(ListJobsResponse { jobs, count }))
}

/// Worker-level liveness heartbeat; upserts the registry row on first
/// contact, so heartbeating before any claim is valid.
pub async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(request): Json<WorkerHeartbeatRequest>,
) -> ApiResult<Json<WorkerHeartbeatResponse>> {
    if request.worker_id.trim().is_empty() {
        return Err(ApiError::InvalidArgument(
            "worker_id must not be empty".into(),
        ));
    }
    let info = state.workers.heartbeat(&request).await?;
    Ok(Json(WorkerHeartbeatResponse {
        worker_id: info.worker_id,
        status: info.status,
        last_heartbeat: info.last_heartbeat,
    }))
}

pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Json<ListWorkersResponse>> {
    let workers = state.workers.list_live().await?;
    let count = workers.len();
    Ok(Json(ListWorkersResponse { workers, count }))
}

pub async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListIssuesResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ResolutionStatus>)
        .transpose()
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

    let issues = state.issues.list(status, query.limit()).await?;
    let count = issues.len();
    Ok(Json(ListIssuesResponse { issues, count }))
}

pub async fn resolve_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<String>,
    Json(request): Json<ResolveIssueRequest>,
) -> ApiResult<StatusCode> {
    if request.resolution_status == ResolutionStatus::Pending {
        return Err(ApiError::InvalidArgument(
            "resolution_status must not be 'pending'".into(),
        ));
    }
    state.issues.resolve(&issue_id, &request).await?;
    Ok(StatusCode::OK)
}

async fn ensure_job_exists(state: &AppState, job_id: &str) -> ApiResult<()> {
    state
        .jobs
        .get(job_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))
}

fn parse_job_id(raw: &str) -> ApiResult<drover_ids::JobId> {
    drover_ids::JobId::parse(raw).map_err(|_| ApiError::NotFound(format!("job {raw}")))
}
