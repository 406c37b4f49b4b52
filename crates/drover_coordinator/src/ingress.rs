//! Submission ingress.
//!
//! The submission path never blocks on store latency: a submission is
//! assigned an identifier, pushed into a bounded hand-off channel, and
//! acknowledged immediately. The queue writer drains the channel and
//! performs the durable insert. Submitters confirm persistence by querying
//! the job afterwards.

use drover_ids::JobId;
use drover_protocol::{JobMessage, SubmitJobRequest, SubmitJobResponse};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("job_type must not be empty")]
    EmptyJobType,
    #[error("submission queue is full")]
    Saturated,
    #[error("submission queue is closed")]
    Closed,
}

/// Producer side of the C1 -> C2 hand-off.
#[derive(Debug, Clone)]
pub struct SubmissionQueue {
    tx: mpsc::Sender<JobMessage>,
    default_max_retries: u32,
}

impl SubmissionQueue {
    /// Create the hand-off; the receiver goes to the [`crate::QueueWriter`].
    pub fn new(depth: usize, default_max_retries: u32) -> (Self, mpsc::Receiver<JobMessage>) {
        let (tx, rx) = mpsc::channel(depth);
        (
            Self {
                tx,
                default_max_retries,
            },
            rx,
        )
    }

    /// Accept a submission into the hand-off.
    ///
    /// Success means the message is buffered for the queue writer, not that
    /// the job is persisted yet.
    pub fn submit(&self, request: SubmitJobRequest) -> Result<SubmitJobResponse, IngressError> {
        if request.job_type.trim().is_empty() {
            return Err(IngressError::EmptyJobType);
        }

        let message = JobMessage {
            job_id: JobId::generate(),
            job_type: request.job_type,
            config: request.config,
            max_retries: request.max_retries.unwrap_or(self.default_max_retries),
            created_at: chrono::Utc::now(),
        };
        let job_id = message.job_id.clone();

        self.tx.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => IngressError::Saturated,
            mpsc::error::TrySendError::Closed(_) => IngressError::Closed,
        })?;

        debug!("Submission {} accepted into hand-off", job_id);
        Ok(SubmitJobResponse {
            job_id,
            status: "queued".to_string(),
        })
    }
}
