//! Canonical types and wire contracts for Drover.
//!
//! Everything that crosses a boundary lives here: the job and worker
//! lifecycle enums, the legal state-transition graph, the submission
//! envelope handed from the ingress to the queue writer, and the HTTP
//! request/response bodies. This crate performs no I/O.

pub mod api;
pub mod types;

pub mod defaults;

pub use api::*;
pub use types::*;

pub use drover_ids::{IdParseError, JobId, JOB_ID_LEN};
