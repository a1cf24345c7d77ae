use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{SyncEngine, SyncOutcome};
use super::status::SyncStatus;
use crate::connectivity::NetworkStatus;

/// Shortest accepted timer period. `tokio::time::interval` panics on zero.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How often an attached network probe is re-sampled for transitions.
pub const PROBE_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    Reconnect,
}

/// Drives the engine from a periodic timer and from offline→online edges.
/// Edges come from platform reports or, when the monitor has a probe, from
/// re-sampling it every [`PROBE_POLL_INTERVAL`]. Each trigger spawns its own pass so that overlapping triggers reach the
/// engine's re-entrancy check and are dropped there.
pub struct BackgroundSyncService {
    engine: Arc<SyncEngine>,
    interval: Duration,
    is_running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    next_sync_at: Arc<AtomicI64>,
}

impl BackgroundSyncService {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(MIN_INTERVAL),
            is_running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            next_sync_at: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Start the background loop. Returns `None` if it is already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return None;
        }

        let engine = self.engine.clone();
        let interval = self.interval;
        let is_running = self.is_running.clone();
        let shutdown = self.shutdown.clone();
        let next_sync_at = self.next_sync_at.clone();

        tracing::info!("Background sync started, interval {:?}", interval);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut connectivity = engine.connectivity().subscribe();
            let mut watching = true;
            let polling = engine.connectivity().has_probe();
            let mut poll = tokio::time::interval(PROBE_POLL_INTERVAL.min(interval));
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = ticker.tick() => {
                        let next = chrono::Utc::now().timestamp_millis() + interval.as_millis() as i64;
                        next_sync_at.store(next, Ordering::SeqCst);
                        Self::spawn_pass(engine.clone(), Trigger::Timer);
                    }
                    _ = poll.tick(), if polling => {
                        engine.connectivity().refresh();
                    }
                    changed = connectivity.changed(), if watching => {
                        if changed.is_err() {
                            tracing::warn!("Connectivity monitor closed, relying on timer only");
                            watching = false;
                            continue;
                        }
                        let status = *connectivity.borrow_and_update();
                        if status == NetworkStatus::Online {
                            Self::spawn_pass(engine.clone(), Trigger::Reconnect);
                        }
                    }
                }
            }

            is_running.store(false, Ordering::SeqCst);
            next_sync_at.store(0, Ordering::SeqCst);
            tracing::info!("Background sync stopped");
        }))
    }

    /// Stop the background loop. A pass already in flight runs to completion.
    pub fn stop(&self) {
        if self.is_running.load(Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Manual trigger. Dropped if a pass is already running.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.engine.sync_now().await
    }

    pub fn is_syncing(&self) -> bool {
        self.engine.is_syncing()
    }

    pub async fn has_pending_changes(&self) -> bool {
        self.engine.has_pending_changes().await
    }

    pub async fn status(&self) -> SyncStatus {
        self.engine.status().await
    }

    pub fn next_sync_at(&self) -> Option<i64> {
        let val = self.next_sync_at.load(Ordering::SeqCst);
        if val > 0 {
            Some(val)
        } else {
            None
        }
    }

    fn spawn_pass(engine: Arc<SyncEngine>, trigger: Trigger) {
        tokio::spawn(async move {
            tracing::debug!("Sync pass triggered by {:?}", trigger);
            engine.sync_now().await;
        });
    }
}
