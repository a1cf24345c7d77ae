//! Runtime configuration, read from `FIELDSYNC_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PREVIEW_SCAN_LIMIT: usize = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub primary_collection: String,
    pub secondary_collection: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: None,
            primary_collection: "work_logs".to_string(),
            secondary_collection: "shift_logs".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub backend: BackendConfig,
    pub max_retry: u32,
    pub sync_interval_secs: u64,
    /// Directory for the photo preview cache. `None` disables the cache.
    pub preview_dir: Option<PathBuf>,
    pub preview_scan_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:fieldsync.db?mode=rwc".to_string(),
            backend: BackendConfig::default(),
            max_retry: DEFAULT_MAX_RETRY,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            preview_dir: None,
            preview_scan_limit: DEFAULT_PREVIEW_SCAN_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set-but-unparseable numbers are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("FIELDSYNC_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(url) = lookup("FIELDSYNC_BACKEND_URL") {
            config.backend.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("FIELDSYNC_API_KEY").filter(|k| !k.is_empty()) {
            config.backend.api_key = Some(key);
        }
        if let Some(name) = lookup("FIELDSYNC_PRIMARY_COLLECTION") {
            config.backend.primary_collection = name;
        }
        if let Some(name) = lookup("FIELDSYNC_SECONDARY_COLLECTION") {
            config.backend.secondary_collection = name;
        }
        if let Some(raw) = lookup("FIELDSYNC_MAX_RETRY") {
            config.max_retry = parse("FIELDSYNC_MAX_RETRY", raw)?;
        }
        if let Some(raw) = lookup("FIELDSYNC_SYNC_INTERVAL_SECS") {
            let secs: u64 = parse("FIELDSYNC_SYNC_INTERVAL_SECS", raw)?;
            config.sync_interval_secs = secs.max(1);
        }
        if let Some(dir) = lookup("FIELDSYNC_PREVIEW_DIR").filter(|d| !d.is_empty()) {
            config.preview_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("FIELDSYNC_PREVIEW_SCAN_LIMIT") {
            config.preview_scan_limit = parse("FIELDSYNC_PREVIEW_SCAN_LIMIT", raw)?;
        }

        Ok(config)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}
