//! Drover coordinator.
//!
//! Mediates between job submitters and a fleet of distributed workers:
//! submissions enter through a non-blocking hand-off ([`ingress`]), are
//! durably persisted by the queue writer ([`writer`]), claimed atomically by
//! capability-matched workers ([`store::jobs`]), recovered from worker death
//! by the reclamation loop ([`reaper`]), and observed through the HTTP query
//! surface ([`api`]). All orchestration state lives in the relational store.

pub mod api;
pub mod config;
pub mod ingress;
pub mod reaper;
pub mod store;
pub mod writer;

pub use api::{router, AppState};
pub use config::CoordinatorConfig;
pub use ingress::SubmissionQueue;
pub use reaper::ReclamationLoop;
pub use writer::QueueWriter;
