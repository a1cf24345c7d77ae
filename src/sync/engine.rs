//! Replays queued operations against the backend.
//!
//! A pass drains each kind's queue in FIFO order, one awaited call at a time.
//! Operations are removed only after their own call succeeds; failures bump
//! the retry count and stay queued. Operations at the retry cap are skipped
//! and left for the caller to purge or requeue (see [`SyncEngine::stalled`]).
//!
//! Only one pass runs at a time. A trigger that arrives mid-pass is dropped,
//! not deferred.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend::{BackendError, RemoteBackend};
use super::queue::PendingStore;
use super::status::{get_last_sync_at, set_last_sync_at, SyncStatus};
use super::types::{Action, EntityKind, PendingOperation};
use crate::config::DEFAULT_MAX_RETRY;
use crate::connectivity::ConnectivityMonitor;
use crate::db::KeyValueStore;
use crate::notifications::NotificationService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Operations left untouched because they hit the retry cap.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Offline,
    AlreadyRunning,
    Completed(SyncReport),
}

/// Clears the re-entrancy flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    kv: Arc<dyn KeyValueStore>,
    store: PendingStore,
    backend: Arc<dyn RemoteBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    notifications: NotificationService,
    max_retry: u32,
    is_syncing: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        backend: Arc<dyn RemoteBackend>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store: PendingStore::new(kv.clone()),
            kv,
            backend,
            connectivity,
            notifications: NotificationService::new(),
            max_retry: DEFAULT_MAX_RETRY,
            is_syncing: AtomicBool::new(false),
        }
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationService) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Record an intent made while offline. Always returns the operation's
    /// temp id, even if persisting it failed.
    pub async fn enqueue(&self, op: PendingOperation) -> String {
        let temp_id = op.temp_id.clone();
        if !self.store.append(op).await {
            tracing::warn!("Offline change {} was not persisted", temp_id);
        }
        temp_id
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    pub async fn has_pending_changes(&self) -> bool {
        self.store.total_len().await > 0
    }

    pub async fn status(&self) -> SyncStatus {
        let mut lengths = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            lengths.push(self.store.len(kind).await);
        }
        SyncStatus::project(
            &lengths,
            get_last_sync_at(self.kv.as_ref()).await,
            self.connectivity.is_online(),
        )
    }

    /// Run one sync pass now.
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping sync pass");
            return SyncOutcome::Offline;
        }

        let Some(_guard) = PassGuard::acquire(&self.is_syncing) else {
            tracing::debug!("Sync already in progress, skipping duplicate request");
            return SyncOutcome::AlreadyRunning;
        };

        let mut snapshot = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            snapshot.push((kind, self.store.list(kind).await));
        }

        let total: usize = snapshot.iter().map(|(_, ops)| ops.len()).sum();
        tracing::info!("Starting sync pass: {} pending operations", total);

        let mut report = SyncReport::default();
        for (kind, ops) in snapshot {
            self.drain(kind, ops, &mut report).await;
        }

        if report.succeeded > 0 {
            set_last_sync_at(self.kv.as_ref(), chrono::Utc::now().timestamp_millis()).await;
            self.notifications.notify_sync_complete(report.succeeded);
        }
        self.notifications.notify_sync_failed(report.failed);

        tracing::info!(
            "Sync pass completed: succeeded={}, failed={}, skipped={}",
            report.succeeded,
            report.failed,
            report.skipped
        );

        SyncOutcome::Completed(report)
    }

    async fn drain(&self, kind: EntityKind, ops: Vec<PendingOperation>, report: &mut SyncReport) {
        for op in ops {
            if op.is_exhausted(self.max_retry) {
                report.skipped += 1;
                continue;
            }

            match self.dispatch(&op).await {
                Ok(()) => {
                    self.store.remove(kind, &op.temp_id).await;
                    report.succeeded += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to replay {} {:?} {}: {}",
                        kind.as_str(),
                        op.action,
                        op.temp_id,
                        e
                    );
                    self.store.bump_retry(kind, &op.temp_id).await;
                    report.failed += 1;
                }
            }
        }
    }

    async fn dispatch(&self, op: &PendingOperation) -> Result<(), BackendError> {
        match op.action {
            Action::Create => self.backend.insert(op.entity_kind, &op.payload).await,
            Action::Update | Action::Close => {
                let record_id = op
                    .record_id
                    .as_deref()
                    .ok_or_else(|| BackendError::MissingRecordId(op.temp_id.clone()))?;
                self.backend
                    .update(op.entity_kind, record_id, &op.payload)
                    .await
            }
        }
    }

    /// Operations that reached the retry cap, across both kinds, in queue order.
    pub async fn stalled(&self) -> Vec<PendingOperation> {
        let mut stalled = Vec::new();
        for kind in EntityKind::ALL {
            stalled.extend(
                self.store
                    .list(kind)
                    .await
                    .into_iter()
                    .filter(|op| op.is_exhausted(self.max_retry)),
            );
        }
        stalled
    }

    /// Drop every stalled operation. Returns how many were removed.
    pub async fn purge_stalled(&self) -> usize {
        let mut purged = 0;
        for op in self.stalled().await {
            if self.store.remove(op.entity_kind, &op.temp_id).await {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::warn!("Purged {} stalled operations", purged);
        }
        purged
    }

    /// Give a stalled operation a fresh start at the tail of its queue under a
    /// new temp id. Returns the new id, or `None` if `temp_id` is not stalled
    /// or the queue could not be rewritten. On failure the original stays
    /// queued and no copy is left behind.
    pub async fn requeue_stalled(&self, temp_id: &str) -> Option<String> {
        let op = self
            .stalled()
            .await
            .into_iter()
            .find(|op| op.temp_id == temp_id)?;

        let kind = op.entity_kind;
        let fresh = op.reissue();
        let fresh_id = fresh.temp_id.clone();
        if !self.store.append(fresh).await {
            return None;
        }
        if !self.store.remove(kind, temp_id).await {
            tracing::error!(
                "Failed to retire stalled operation {}, rolling back {}",
                temp_id,
                fresh_id
            );
            if !self.store.remove(kind, &fresh_id).await {
                tracing::error!("Rollback failed, {} and {} are both queued", temp_id, fresh_id);
            }
            return None;
        }

        tracing::info!("Requeued stalled operation {} as {}", temp_id, fresh_id);
        Some(fresh_id)
    }
}
