//! Drover worker agent harness.
//!
//! A worker claims typed jobs from the coordinator, executes them through a
//! registered [`JobHandler`], and reports heartbeats, checkpoints, logs, and
//! data-quality findings back. Job payloads stay opaque to the harness; the
//! handler interprets `config` and `checkpoint` itself.
//!
//! Design principles:
//! - One `reqwest` client created at startup, reused for all calls
//! - Cooperative stop: a progress report answering `cancelled` (or a
//!   precondition rejection) flips the job's stop signal with the reason,
//!   and the handler is expected to observe it
//! - A precondition rejection means the coordinator reassigned or finished
//!   the job elsewhere; the worker discards its local result

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod worker;

pub use client::CoordinatorClient;
pub use config::WorkerConfig;
pub use error::ClientError;
pub use handler::{JobContext, JobHandler, StopReason, StopSignal};
pub use worker::Worker;
