// Library entry point
pub mod config;
pub mod connectivity;
pub mod db;
pub mod notifications;
pub mod previews;
pub mod sync;

use std::sync::Arc;

use config::Config;
use connectivity::ConnectivityMonitor;
use db::{Database, DbError, KeyValueStore, SqliteKvStore};
use notifications::NotificationService;
use previews::PhotoPreviewCache;
use sync::{BackgroundSyncService, RestBackend, SyncEngine};

/// Everything a field app needs to record work offline and sync it later.
pub struct AppState {
    pub db: Database,
    pub engine: Arc<SyncEngine>,
    pub background_sync: BackgroundSyncService,
    pub previews: PhotoPreviewCache,
    pub notifications: NotificationService,
}

impl AppState {
    pub async fn init(
        config: &Config,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Result<Self, DbError> {
        let db = Database::connect(&config.database_url).await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(db.clone()));
        let notifications = NotificationService::new();

        let engine = Arc::new(
            SyncEngine::new(kv, Arc::new(RestBackend::new(&config.backend)), connectivity)
                .with_max_retry(config.max_retry)
                .with_notifications(notifications.clone()),
        );
        let background_sync = BackgroundSyncService::new(engine.clone(), config.sync_interval());
        let previews = PhotoPreviewCache::new(config.preview_dir.clone(), config.preview_scan_limit);

        Ok(Self {
            db,
            engine,
            background_sync,
            previews,
            notifications,
        })
    }
}
