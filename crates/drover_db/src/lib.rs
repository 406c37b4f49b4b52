//! Store access layer for Drover.
//!
//! The relational store is the single source of truth for all orchestration
//! state; the coordinator holds nothing but the submission hand-off buffer
//! and per-request context. This crate owns pool construction, the schema
//! DDL, and the shared error type.

mod error;
mod pool;
mod schema;

pub use error::{DbError, Result};
pub use pool::{create_pool, DbConfig, DbPool};
pub use schema::init_schema;
