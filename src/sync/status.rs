//! Read-model over the queues, the last successful sync, and connectivity.
//! Always recomputed, never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::KeyValueStore;

pub const LAST_SYNC_KEY: &str = "last_sync_epoch";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pending_count: usize,
    /// Epoch milliseconds of the last pass with at least one success.
    pub last_sync_at: Option<i64>,
    pub is_online: bool,
}

impl SyncStatus {
    pub fn project(queue_lengths: &[usize], last_sync_at: Option<i64>, is_online: bool) -> Self {
        Self {
            pending_count: queue_lengths.iter().sum(),
            last_sync_at,
            is_online,
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_count > 0
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at.and_then(DateTime::from_timestamp_millis)
    }
}

/// Last successful sync time, or `None` if never synced or unreadable.
pub async fn get_last_sync_at(kv: &dyn KeyValueStore) -> Option<i64> {
    match kv.get(LAST_SYNC_KEY).await {
        Ok(value) => value.and_then(|v| v.parse().ok()),
        Err(e) => {
            tracing::error!("Failed to read last sync timestamp: {}", e);
            None
        }
    }
}

pub async fn set_last_sync_at(kv: &dyn KeyValueStore, epoch_ms: i64) {
    if let Err(e) = kv.set(LAST_SYNC_KEY, &epoch_ms.to_string()).await {
        tracing::error!("Failed to save last sync timestamp: {}", e);
    }
}
