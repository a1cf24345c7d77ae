use fieldsync::config::Config;
use fieldsync::connectivity::{ConnectivityMonitor, NetworkStatus};
use fieldsync::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fieldsync=info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let connectivity = Arc::new(ConnectivityMonitor::new(NetworkStatus::Online));
    let state = match AppState::init(&config, connectivity).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    let status = state.engine.status().await;
    tracing::info!(
        "{} pending changes, last sync: {:?}",
        status.pending_count,
        status.last_sync_time()
    );
    let stalled = state.engine.stalled().await;
    if !stalled.is_empty() {
        tracing::warn!("{} operations have exhausted their retries", stalled.len());
    }

    let mut notices = state.notifications.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            tracing::info!("Notice: {}", notice.message);
        }
    });

    let handle = state.background_sync.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    state.background_sync.stop();
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}
