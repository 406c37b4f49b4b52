//! Database pool creation.
//!
//! Concrete SQLite pool types (rather than `sqlx::AnyPool`) keep full
//! support for `chrono` timestamps and `FromRow` derives in the stores.

use tracing::info;

use crate::error::{DbError, Result};

/// Database pool type alias.
pub type DbPool = sqlx::SqlitePool;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection URL
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// File-backed SQLite configuration, creating the file if missing.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// In-memory SQLite configuration (for testing).
    ///
    /// Pinned to a single connection: each SQLite `:memory:` connection is
    /// its own database.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Configuration from a raw URL.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !url.starts_with("sqlite:") {
            return Err(DbError::InvalidUrl(url));
        }
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        Ok(Self {
            url,
            max_connections,
        })
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Create a database pool and apply store-level pragmas.
pub async fn create_pool(config: DbConfig) -> Result<DbPool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    apply_sqlite_optimizations(&pool).await?;

    info!("Connected to database: {}", config.url);
    Ok(pool)
}

/// WAL mode for concurrent readers during the claim/reclaim write paths.
async fn apply_sqlite_optimizations(pool: &DbPool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pool_connects() {
        let pool = create_pool(DbConfig::sqlite_memory()).await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn file_pool_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.db");
        let config = DbConfig::sqlite(path.to_string_lossy());
        let pool = create_pool(config).await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn from_url_rejects_non_sqlite() {
        let err = DbConfig::from_url("postgres://localhost/drover");
        assert!(matches!(err, Err(DbError::InvalidUrl(_))));
    }
}
