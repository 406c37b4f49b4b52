//! HTTP surface: the coordinator's single external interface.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};

use axum::routing::{get, post};
use axum::Router;
use drover_db::DbPool;

use crate::ingress::SubmissionQueue;
use crate::store::{IssueStore, JobStore, LogStore, WorkerStore};

/// Shared request state. Everything durable lives in the store; this holds
/// only pool handles and the submission hand-off.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    pub workers: WorkerStore,
    pub issues: IssueStore,
    pub logs: LogStore,
    pub submissions: SubmissionQueue,
}

impl AppState {
    pub fn new(pool: DbPool, submissions: SubmissionQueue) -> Self {
        Self {
            jobs: JobStore::new(pool.clone()),
            workers: WorkerStore::new(pool.clone()),
            issues: IssueStore::new(pool.clone()),
            logs: LogStore::new(pool),
            submissions,
        }
    }
}

/// Build the coordinator router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs/submit", post(handlers::submit_job))
        .route("/jobs/claim", post(handlers::claim_job))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:id/status", get(handlers::job_status))
        .route("/jobs/:id/heartbeat", post(handlers::job_heartbeat))
        .route("/jobs/:id/start", post(handlers::start_job))
        .route("/jobs/:id/checkpoint", post(handlers::checkpoint_job))
        .route("/jobs/:id/complete", post(handlers::complete_job))
        .route("/jobs/:id/fail", post(handlers::fail_job))
        .route("/jobs/:id/cancel", post(handlers::cancel_job))
        .route(
            "/jobs/:id/logs",
            post(handlers::append_log).get(handlers::list_job_logs),
        )
        .route("/jobs/:id/issues", post(handlers::report_issue))
        .route("/workers/heartbeat", post(handlers::worker_heartbeat))
        .route("/workers", get(handlers::list_workers))
        .route("/data-quality/issues", get(handlers::list_issues))
        .route(
            "/data-quality/issues/:id/resolve",
            post(handlers::resolve_issue),
        )
        .with_state(state)
}
