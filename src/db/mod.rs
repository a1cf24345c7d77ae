pub mod kv;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::time::Duration;
use thiserror::Error;

pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the on-device database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        if let Some(path) = file_path_of(url) {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        tracing::info!("Opening database at: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Self::migrate(pool).await
    }

    /// A private in-memory database. A single connection is kept alive for the
    /// pool's lifetime, otherwise SQLite would hand out a fresh empty database.
    pub async fn in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Database initialized successfully");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn file_path_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_extraction() {
        assert_eq!(file_path_of("sqlite:data/fieldsync.db?mode=rwc"), Some("data/fieldsync.db"));
        assert_eq!(file_path_of("sqlite:///tmp/a.db"), Some("/tmp/a.db"));
        assert_eq!(file_path_of("sqlite::memory:"), None);
        assert_eq!(file_path_of("postgres://localhost"), None);
    }

    #[tokio::test]
    async fn test_in_memory_database_runs_migrations() {
        let db = Database::in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_store")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn test_connect_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fieldsync.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());

        let db = Database::connect(&url).await.unwrap();
        assert!(path.exists());
        drop(db);
    }
}
