//! Canonical lifecycle enums and the submission envelope.

use chrono::{DateTime, Utc};
use drover_ids::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! fmt_as_str {
    () => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.as_str())
        }
    };
}

/// Job lifecycle status. This is the CANONICAL definition - the store, the
/// HTTP surface, and the worker agent all use this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Persisted and waiting to be claimed
    #[default]
    Pending,
    /// Bound to a worker, execution not yet reported
    Claimed,
    /// Worker reported it began processing
    Running,
    /// Terminal success
    Completed,
    /// Terminal failure (retry budget exhausted)
    Failed,
    /// Terminal admin cancellation
    Cancelled,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Claimed,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Claimed => "claimed",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `claimed -> pending` and `running -> pending` are the abandon/retry
    /// edges; `* -> cancelled` is admin cancellation of any non-terminal
    /// state. Terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Pending, Claimed)
                | (Pending, Cancelled)
                | (Claimed, Running)
                | (Claimed, Pending)
                | (Claimed, Failed)
                | (Claimed, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Pending)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fmt_as_str!();
}

impl FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "claimed" => Ok(JobStatus::Claimed),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(StatusParseError::job(s)),
        }
    }
}

/// Worker registry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Heartbeating and executing
    #[default]
    Active,
    /// Heartbeating, no current job
    Idle,
    /// Heartbeat older than the stale threshold
    Offline,
    /// Worker self-reported a fault
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Offline => "offline",
            WorkerStatus::Error => "error",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fmt_as_str!();
}

impl FromStr for WorkerStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WorkerStatus::Active),
            "idle" => Ok(WorkerStatus::Idle),
            "offline" => Ok(WorkerStatus::Offline),
            "error" => Ok(WorkerStatus::Error),
            _ => Err(StatusParseError::worker(s)),
        }
    }
}

/// Severity of a data-quality finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fmt_as_str!();
}

impl FromStr for Severity {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            _ => Err(StatusParseError::severity(s)),
        }
    }
}

/// Resolution state of a data-quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
    AutoFixed,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Ignored => "ignored",
            ResolutionStatus::AutoFixed => "auto_fixed",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fmt_as_str!();
}

impl FromStr for ResolutionStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResolutionStatus::Pending),
            "resolved" => Ok(ResolutionStatus::Resolved),
            "ignored" => Ok(ResolutionStatus::Ignored),
            "auto_fixed" => Ok(ResolutionStatus::AutoFixed),
            _ => Err(StatusParseError::resolution(s)),
        }
    }
}

/// Structured log level reported by workers. Stored verbatim; the
/// coordinator never inspects log lines for decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fmt_as_str!();
}

impl FromStr for LogLevel {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(StatusParseError::log_level(s)),
        }
    }
}

/// Error for enum parsing from query strings and stored values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: '{value}' (expected one of: {expected})")]
pub struct StatusParseError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl StatusParseError {
    fn job(value: &str) -> Self {
        Self {
            kind: "job status",
            value: value.to_string(),
            expected: "pending, claimed, running, completed, failed, cancelled",
        }
    }

    fn worker(value: &str) -> Self {
        Self {
            kind: "worker status",
            value: value.to_string(),
            expected: "active, idle, offline, error",
        }
    }

    fn severity(value: &str) -> Self {
        Self {
            kind: "severity",
            value: value.to_string(),
            expected: "warning, error, critical",
        }
    }

    fn resolution(value: &str) -> Self {
        Self {
            kind: "resolution status",
            value: value.to_string(),
            expected: "pending, resolved, ignored, auto_fixed",
        }
    }

    fn log_level(value: &str) -> Self {
        Self {
            kind: "log level",
            value: value.to_string(),
            expected: "DEBUG, INFO, WARNING, ERROR, CRITICAL",
        }
    }
}

/// Envelope handed from the submission ingress to the queue writer.
///
/// Also the message shape for asynchronous ingress via an external durable
/// queue: at-least-once delivery is safe because the writer's insert is
/// idempotent on `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub job_type: String,
    pub config: Value,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}
