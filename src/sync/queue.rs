//! Durable queue of pending operations.
//!
//! Each entity kind is persisted as one JSON array under its own key and every
//! mutation is a full read-modify-write of that array. That is only correct
//! with a single mutator: all writes in this process go through `write_lock`,
//! and no other process may write the same keys.
//!
//! Storage faults never reach the caller. They are logged and the affected
//! write is dropped, so a broken disk cannot block the user's action.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::types::{EntityKind, PendingOperation};
use crate::db::{DbError, KeyValueStore};

pub struct PendingStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl PendingStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Append to the tail of the operation's kind queue. Returns whether the
    /// operation was persisted.
    pub async fn append(&self, op: PendingOperation) -> bool {
        let _guard = self.write_lock.lock().await;
        let kind = op.entity_kind;
        let temp_id = op.temp_id.clone();

        let result = async {
            let mut ops = self.read(kind).await?;
            ops.push(op);
            self.write(kind, &ops).await?;
            Ok::<usize, DbError>(ops.len())
        }
        .await;

        match result {
            Ok(len) => {
                tracing::info!(
                    "Queued {} operation {}, {} pending for kind",
                    kind.as_str(),
                    temp_id,
                    len
                );
                true
            }
            Err(e) => {
                tracing::error!("Failed to persist pending operation {}: {}", temp_id, e);
                false
            }
        }
    }

    /// Operations of one kind in append order.
    pub async fn list(&self, kind: EntityKind) -> Vec<PendingOperation> {
        match self.read(kind).await {
            Ok(ops) => ops,
            Err(e) => {
                tracing::error!("Failed to read {} queue: {}", kind.as_str(), e);
                Vec::new()
            }
        }
    }

    /// Remove by temp id from `kind`'s queue. Removing an unknown id leaves
    /// storage untouched. Returns whether an entry was actually removed.
    pub async fn remove(&self, kind: EntityKind, temp_id: &str) -> bool {
        let _guard = self.write_lock.lock().await;

        let result = async {
            let mut ops = self.read(kind).await?;
            let before = ops.len();
            ops.retain(|op| op.temp_id != temp_id);
            if ops.len() == before {
                return Ok::<bool, DbError>(false);
            }
            self.write(kind, &ops).await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(removed) => {
                if removed {
                    tracing::debug!("Removed pending operation {}", temp_id);
                }
                removed
            }
            Err(e) => {
                tracing::error!("Failed to remove pending operation {}: {}", temp_id, e);
                false
            }
        }
    }

    /// Increment one operation's retry count in `kind`'s queue. Returns the new
    /// count, or `None` if the id is unknown or the write failed.
    pub async fn bump_retry(&self, kind: EntityKind, temp_id: &str) -> Option<u32> {
        let _guard = self.write_lock.lock().await;

        let result = async {
            let mut ops = self.read(kind).await?;
            let Some(op) = ops.iter_mut().find(|op| op.temp_id == temp_id) else {
                return Ok::<Option<u32>, DbError>(None);
            };
            op.retry_count = op.retry_count.saturating_add(1);
            let count = op.retry_count;
            self.write(kind, &ops).await?;
            Ok(Some(count))
        }
        .await;

        match result {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to bump retry for {}: {}", temp_id, e);
                None
            }
        }
    }

    pub async fn len(&self, kind: EntityKind) -> usize {
        self.list(kind).await.len()
    }

    pub async fn total_len(&self) -> usize {
        let mut total = 0;
        for kind in EntityKind::ALL {
            total += self.len(kind).await;
        }
        total
    }

    async fn read(&self, kind: EntityKind) -> Result<Vec<PendingOperation>, DbError> {
        match self.kv.get(&kind.storage_key()).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write(&self, kind: EntityKind, ops: &[PendingOperation]) -> Result<(), DbError> {
        if ops.is_empty() {
            return self.kv.remove(&kind.storage_key()).await;
        }
        let json = serde_json::to_string(ops)?;
        self.kv.set(&kind.storage_key(), &json).await
    }
}
