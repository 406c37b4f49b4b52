//! Default tuning values shared by the coordinator and its clients.

/// Seconds without a heartbeat before a worker is considered stale.
pub const STALE_THRESHOLD_SECS: u64 = 300;

/// Seconds between liveness/recovery passes. Must stay below
/// [`STALE_THRESHOLD_SECS`] / 2.
pub const RECLAIM_INTERVAL_SECS: u64 = 30;

/// Capacity of the submission hand-off between ingress and queue writer.
pub const SUBMIT_QUEUE_DEPTH: usize = 1024;

/// Store-write attempts per submission before dead-lettering.
pub const WRITER_RETRY_BUDGET: u32 = 5;

/// Default retry budget for a job whose submitter did not set one.
pub const JOB_MAX_RETRIES: u32 = 3;
