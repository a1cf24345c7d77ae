//! Online/offline tracking.
//!
//! The platform reports transitions with [`ConnectivityMonitor::report`];
//! interested parties subscribe to a `watch` channel and react to edges. When
//! a [`NetworkProbe`] is attached, `is_online` samples it live instead of
//! trusting the last report. A probe that cannot answer counts as online, so
//! queued work is never trapped behind a broken sensor.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Network state unavailable: {0}")]
    Unavailable(String),
}

pub trait NetworkProbe: Send + Sync {
    fn is_online(&self) -> Result<bool, ConnectivityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

pub struct ConnectivityMonitor {
    status: watch::Sender<NetworkStatus>,
    probe: Option<Arc<dyn NetworkProbe>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status,
            probe: None,
        }
    }

    pub fn with_probe(probe: Arc<dyn NetworkProbe>) -> Self {
        let initial = sample(probe.as_ref());
        let (status, _) = watch::channel(initial);
        Self {
            status,
            probe: Some(probe),
        }
    }

    pub fn is_online(&self) -> bool {
        match &self.probe {
            Some(probe) => sample(probe.as_ref()) == NetworkStatus::Online,
            None => *self.status.borrow() == NetworkStatus::Online,
        }
    }

    /// Record a platform transition. Subscribers are only woken on an actual
    /// change.
    pub fn report(&self, status: NetworkStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });

        if changed {
            match status {
                NetworkStatus::Online => tracing::info!("Network: online"),
                NetworkStatus::Offline => tracing::warn!("Network: offline"),
            }
        }
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    /// Re-sample the probe and publish the result as a transition.
    pub fn refresh(&self) {
        if let Some(probe) = &self.probe {
            self.report(sample(probe.as_ref()));
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}

fn sample(probe: &dyn NetworkProbe) -> NetworkStatus {
    match probe.is_online() {
        Ok(online) => online.into(),
        Err(e) => {
            tracing::warn!("{}, assuming online", e);
            NetworkStatus::Online
        }
    }
}
