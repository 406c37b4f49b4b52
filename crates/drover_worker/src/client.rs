//! HTTP client for the coordinator API.

use drover_protocol::{
    AppendLogRequest, CheckpointRequest, ClaimRequest, ClaimResponse, CompleteJobRequest,
    ErrorResponse, FailJobRequest, JobDetailResponse, JobStatus, JobStatusResponse, LogLevel,
    ReportIssueRequest, ReportIssueResponse, StartJobRequest, SubmitJobRequest,
    SubmitJobResponse, WorkerHeartbeatRequest, WorkerHeartbeatResponse,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin typed wrapper over the coordinator's HTTP surface. Clone shares the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Enqueue a job. A success response means "accepted into the
    /// coordinator's hand-off"; poll [`Self::job_detail`] to confirm
    /// persistence.
    pub async fn submit(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/jobs/submit"))
            .json(request)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Claim the next eligible job; `None` means no work is available.
    pub async fn claim(&self, request: &ClaimRequest) -> Result<Option<ClaimResponse>, ClientError> {
        let response = self
            .http
            .post(self.url("/jobs/claim"))
            .json(request)
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => Ok(Some(response.json().await?)),
            _ => Err(api_error(response).await),
        }
    }

    pub async fn heartbeat(
        &self,
        request: &WorkerHeartbeatRequest,
    ) -> Result<WorkerHeartbeatResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/workers/heartbeat"))
            .json(request)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Job-level progress heartbeat; the returned status is how a worker
    /// observes cancellation.
    pub async fn job_heartbeat(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/heartbeat")))
            .json(&serde_json::json!({"worker_id": worker_id}))
            .send()
            .await?;
        let body: JobStatusResponse = expect_json(response).await?;
        Ok(body.status)
    }

    pub async fn start(&self, job_id: &str, worker_id: &str) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/start")))
            .json(&StartJobRequest {
                worker_id: worker_id.to_string(),
            })
            .send()
            .await?;
        let body: JobStatusResponse = expect_json(response).await?;
        Ok(body.status)
    }

    pub async fn checkpoint(
        &self,
        job_id: &str,
        worker_id: &str,
        checkpoint: Value,
    ) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/checkpoint")))
            .json(&CheckpointRequest {
                worker_id: worker_id.to_string(),
                checkpoint,
            })
            .send()
            .await?;
        let body: JobStatusResponse = expect_json(response).await?;
        Ok(body.status)
    }

    pub async fn complete(&self, job_id: &str, worker_id: &str) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/complete")))
            .json(&CompleteJobRequest {
                worker_id: worker_id.to_string(),
            })
            .send()
            .await?;
        let body: JobStatusResponse = expect_json(response).await?;
        Ok(body.status)
    }

    /// Report failure; the returned status says whether the job went back to
    /// `pending` or is terminally `failed`.
    pub async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error_message: &str,
    ) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/fail")))
            .json(&FailJobRequest {
                worker_id: worker_id.to_string(),
                error_message: error_message.to_string(),
            })
            .send()
            .await?;
        let body: JobStatusResponse = expect_json(response).await?;
        Ok(body.status)
    }

    pub async fn append_log(
        &self,
        job_id: &str,
        worker_id: &str,
        level: LogLevel,
        message: &str,
        context: Option<Value>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/logs")))
            .json(&AppendLogRequest {
                worker_id: worker_id.to_string(),
                level,
                message: message.to_string(),
                context,
            })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    pub async fn report_issue(
        &self,
        job_id: &str,
        request: &ReportIssueRequest,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/jobs/{job_id}/issues")))
            .json(request)
            .send()
            .await?;
        let body: ReportIssueResponse = expect_json(response).await?;
        Ok(body.issue_id)
    }

    pub async fn job_detail(&self, job_id: &str) -> Result<JobDetailResponse, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{job_id}/status")))
            .send()
            .await?;
        expect_json(response).await
    }
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(api_error(response).await)
    }
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    match response.json::<ErrorResponse>().await {
        Ok(body) => ClientError::Api {
            status,
            error: body.error,
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status,
            error: "unknown".to_string(),
            message: "response body was not a coordinator error envelope".to_string(),
        },
    }
}
