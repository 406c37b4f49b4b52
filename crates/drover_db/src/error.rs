//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Store errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ownership or state transition precondition failed
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Operation conflicts with current state (e.g. already terminal)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid connection URL
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// Stored value no longer decodes into its canonical type
    #[error("Corrupt stored value: {0}")]
    Decode(String),

    /// Stored blob failed to round-trip
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
