//! The handler seam: where opaque payloads meet executable work.

use async_trait::async_trait;
use drover_protocol::{ClaimResponse, JobStatus, LogLevel, ReportIssueRequest};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::client::CoordinatorClient;
use crate::error::ClientError;

/// Why a job execution (or the agent's claim loop) was told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The coordinator reported the job as cancelled.
    Cancelled,
    /// The coordinator no longer recognizes this worker as the job's owner;
    /// any local result must be discarded.
    OwnershipLost,
    /// The agent itself is shutting down.
    Shutdown,
}

const RUNNING: u8 = 0;
const STOP_CANCELLED: u8 = 1;
const STOP_OWNERSHIP_LOST: u8 = 2;
const STOP_SHUTDOWN: u8 = 3;

/// Sticky stop signal shared between the heartbeat ticker, the reporting
/// surface, and the handler. The first recorded reason wins, so the handler
/// always sees why it was stopped even when cancellation and ownership loss
/// race. Clone is cheap and shares state.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    state: Arc<AtomicU8>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            STOP_CANCELLED => Some(StopReason::Cancelled),
            STOP_OWNERSHIP_LOST => Some(StopReason::OwnershipLost),
            STOP_SHUTDOWN => Some(StopReason::Shutdown),
            _ => None,
        }
    }

    /// Record a stop reason; later calls are no-ops.
    pub fn stop(&self, reason: StopReason) {
        let encoded = match reason {
            StopReason::Cancelled => STOP_CANCELLED,
            StopReason::OwnershipLost => STOP_OWNERSHIP_LOST,
            StopReason::Shutdown => STOP_SHUTDOWN,
        };
        let _ = self
            .state
            .compare_exchange(RUNNING, encoded, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Reporting surface handed to a [`JobHandler`] for the duration of one job.
///
/// Checkpoint and log calls also surface cancellation: when the coordinator
/// answers a progress report with `cancelled` (or rejects it as no longer
/// ours), the context's stop signal flips and the handler is expected to
/// wind down at its next convenient point.
#[derive(Debug, Clone)]
pub struct JobContext {
    client: CoordinatorClient,
    worker_id: String,
    job_id: String,
    stop: StopSignal,
}

impl JobContext {
    pub(crate) fn new(
        client: CoordinatorClient,
        worker_id: String,
        job_id: String,
        stop: StopSignal,
    ) -> Self {
        Self {
            client,
            worker_id,
            job_id,
            stop,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// True once the coordinator cancelled the job, reassigned it, or the
    /// agent is shutting down.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop.reason()
    }

    /// Persist opaque resume state; overwrites the previous checkpoint.
    pub async fn checkpoint(&self, checkpoint: Value) -> Result<(), ClientError> {
        let status = self
            .client
            .checkpoint(&self.job_id, &self.worker_id, checkpoint)
            .await
            .map_err(|err| self.observe(err))?;
        if status == JobStatus::Cancelled {
            self.stop.stop(StopReason::Cancelled);
        }
        Ok(())
    }

    /// Append a structured log line to the job's execution log.
    pub async fn log(
        &self,
        level: LogLevel,
        message: &str,
        context: Option<Value>,
    ) -> Result<(), ClientError> {
        self.client
            .append_log(&self.job_id, &self.worker_id, level, message, context)
            .await
    }

    /// Report a data-quality finding against the job's input.
    pub async fn report_issue(&self, request: &ReportIssueRequest) -> Result<String, ClientError> {
        self.client.report_issue(&self.job_id, request).await
    }

    /// A precondition rejection means ownership is gone; flip the signal so
    /// the handler winds down instead of retrying.
    fn observe(&self, err: ClientError) -> ClientError {
        if err.is_precondition() {
            debug!("Job {}: ownership lost, stopping local execution", self.job_id);
            self.stop.stop(StopReason::OwnershipLost);
        }
        err
    }
}

/// Executes one claimed job. Implementations interpret `config` and
/// `checkpoint` themselves; the harness never looks inside either.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: ClaimResponse, ctx: &JobContext) -> anyhow::Result<()>;
}
