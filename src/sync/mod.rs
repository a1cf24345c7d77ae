//! Offline mutation queue and its replay against the backend

pub mod background;
pub mod backend;
pub mod engine;
pub mod queue;
pub mod status;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use background::BackgroundSyncService;
pub use backend::{BackendError, RemoteBackend, RestBackend};
pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use queue::PendingStore;
pub use status::{get_last_sync_at, SyncStatus};
pub use types::{Action, EntityKind, Payload, PendingOperation};
