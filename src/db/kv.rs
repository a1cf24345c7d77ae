//! String-keyed persistent storage.
//!
//! The queue and sync bookkeeping only ever need `get`/`set`/`remove` on
//! opaque string values, so everything above this layer is written against
//! [`KeyValueStore`] rather than a concrete database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{Database, DbError};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), DbError>;
    async fn remove(&self, key: &str) -> Result<(), DbError>;
}

/// `kv_store` table in the on-device SQLite database.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DbError> {
        sqlx::query("INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, DbError> {
        self.entries
            .lock()
            .map_err(|_| DbError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DbError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("2".to_string()));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_get_set_remove() {
        let db = Database::in_memory().await.unwrap();
        exercise(&SqliteKvStore::new(db)).await;
    }

    #[tokio::test]
    async fn test_memory_store_get_set_remove() {
        exercise(&MemoryKvStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("kv.db").display());

        {
            let store = SqliteKvStore::new(Database::connect(&url).await.unwrap());
            store.set("pending", "[1,2,3]").await.unwrap();
        }

        let store = SqliteKvStore::new(Database::connect(&url).await.unwrap());
        assert_eq!(store.get("pending").await.unwrap(), Some("[1,2,3]".to_string()));
    }
}
