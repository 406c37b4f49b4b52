//! Worker agent configuration (plain data).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator base URL, e.g. `http://127.0.0.1:7450`.
    pub coordinator_url: String,
    /// Stable externally-supplied worker identifier.
    pub worker_id: String,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    /// Delay between claim attempts when no work is available.
    pub poll_interval: Duration,
    /// Cadence of job-level heartbeats while executing.
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn new(coordinator_url: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            coordinator_url: coordinator_url.into(),
            worker_id: worker_id.into(),
            hostname: hostname(),
            ip_address: None,
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty())
}
