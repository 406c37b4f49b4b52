//! Worker-side client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, decode).
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The coordinator rejected the request.
    #[error("coordinator rejected the request ({status} {error}): {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },
}

impl ClientError {
    /// The coordinator no longer recognizes this worker as the job's owner
    /// (reassigned, failed by recovery, or out-of-graph transition). The
    /// worker must discard its local state for the job.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ClientError::Api { status: 412, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}
