//! Test doubles shared by the sync module tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::backend::{BackendError, RemoteBackend};
use super::types::{EntityKind, Payload};
use crate::db::{DbError, KeyValueStore, MemoryKvStore};

pub fn payload(n: i32) -> Payload {
    serde_json::json!({ "account_id": format!("acc-{}", n), "seq": n })
        .as_object()
        .cloned()
        .unwrap()
}

/// Payload the mock backend will reject.
pub fn failing_payload(n: i32) -> Payload {
    let mut fields = payload(n);
    fields.insert("fail".into(), serde_json::Value::Bool(true));
    fields
}

/// Every read and write fails.
pub struct FailingKvStore;

#[async_trait]
impl KeyValueStore for FailingKvStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, DbError> {
        Err(DbError::Unavailable("disk full".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), DbError> {
        Err(DbError::Unavailable("disk full".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), DbError> {
        Err(DbError::Unavailable("disk full".into()))
    }
}

/// In-memory store whose `n`th write (set or remove, counted from zero) fails.
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    writes: AtomicUsize,
    fail_on: usize,
}

impl FlakyKvStore {
    pub fn failing_write(fail_on: usize) -> Self {
        Self {
            inner: MemoryKvStore::new(),
            writes: AtomicUsize::new(0),
            fail_on,
        }
    }

    fn check_write(&self) -> Result<(), DbError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(DbError::Unavailable("write rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), DbError> {
        self.check_write()?;
        self.inner.remove(key).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert(EntityKind, Payload),
    Update(EntityKind, String, Payload),
}

/// Records every call. Rejects payloads carrying `"fail": true`. When gated,
/// the first call signals `entered` and then blocks until `release`.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    gate_used: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: Call, fields: &Payload) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);

        if let Some((entered, release)) = &self.gate {
            if !self.gate_used.swap(true, Ordering::SeqCst) {
                entered.notify_one();
                release.notified().await;
            }
        }

        if fields.get("fail") == Some(&serde_json::Value::Bool(true)) {
            return Err(BackendError::Api {
                status: 500,
                message: "rejected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn insert(&self, kind: EntityKind, fields: &Payload) -> Result<(), BackendError> {
        self.record(Call::Insert(kind, fields.clone()), fields).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        record_id: &str,
        fields: &Payload,
    ) -> Result<(), BackendError> {
        self.record(Call::Update(kind, record_id.to_string(), fields.clone()), fields)
            .await
    }
}
