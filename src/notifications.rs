//! Aggregate sync notifications.
//!
//! A pass produces at most one success and one failure notice. Only counts
//! are reported, never per-operation detail. The UI layer subscribes to the
//! broadcast channel and decides how to show them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncNotice {
    pub kind: NoticeKind,
    pub count: usize,
    pub message: String,
}

#[derive(Clone)]
pub struct NotificationService {
    sender: broadcast::Sender<SyncNotice>,
}

impl NotificationService {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.sender.subscribe()
    }

    /// Notify that `count` queued changes reached the backend. Zero is silent.
    pub fn notify_sync_complete(&self, count: usize) {
        if count == 0 {
            return;
        }
        let message = format!("Synced {} offline change(s)", count);
        tracing::info!("{}", message);
        self.emit(SyncNotice {
            kind: NoticeKind::Success,
            count,
            message,
        });
    }

    /// Notify that `count` queued changes failed this pass. Zero is silent.
    pub fn notify_sync_failed(&self, count: usize) {
        if count == 0 {
            return;
        }
        let message = format!("Failed to sync {} change(s)", count);
        tracing::warn!("{}", message);
        self.emit(SyncNotice {
            kind: NoticeKind::Failure,
            count,
            message,
        });
    }

    fn emit(&self, notice: SyncNotice) {
        // No subscribers is fine; the log line above is the fallback.
        let _ = self.sender.send(notice);
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}
