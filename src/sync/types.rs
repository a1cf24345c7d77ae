//! Pending operation types shared by the queue and the engine

use serde::{Deserialize, Serialize};

/// Field map sent to the backend as-is.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// The two independent record families, each with its own queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PrimaryLog,
    SecondaryLog,
}

impl EntityKind {
    /// Every kind, in the order a sync pass drains them.
    pub const ALL: [EntityKind; 2] = [EntityKind::PrimaryLog, EntityKind::SecondaryLog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryLog => "primary_log",
            Self::SecondaryLog => "secondary_log",
        }
    }

    /// Key the kind's queue is stored under.
    pub fn storage_key(&self) -> String {
        format!("pending_ops:{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub temp_id: String,
    /// Absent for records the backend has not created yet.
    pub record_id: Option<String>,
    pub action: Action,
    pub entity_kind: EntityKind,
    pub payload: Payload,
    /// Epoch milliseconds.
    pub enqueued_at: i64,
    pub retry_count: u32,
}

impl PendingOperation {
    pub fn new(
        entity_kind: EntityKind,
        action: Action,
        record_id: Option<String>,
        payload: Payload,
    ) -> Self {
        Self {
            temp_id: uuid::Uuid::new_v4().to_string(),
            record_id,
            action,
            entity_kind,
            payload,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
        }
    }

    pub fn create(entity_kind: EntityKind, payload: Payload) -> Self {
        Self::new(entity_kind, Action::Create, None, payload)
    }

    pub fn update(entity_kind: EntityKind, record_id: impl Into<String>, payload: Payload) -> Self {
        Self::new(entity_kind, Action::Update, Some(record_id.into()), payload)
    }

    pub fn close(entity_kind: EntityKind, record_id: impl Into<String>, payload: Payload) -> Self {
        Self::new(entity_kind, Action::Close, Some(record_id.into()), payload)
    }

    pub fn is_exhausted(&self, max_retry: u32) -> bool {
        self.retry_count >= max_retry
    }

    /// Same intent under a fresh identity, for re-enqueueing a stalled operation.
    pub fn reissue(&self) -> Self {
        Self::new(
            self.entity_kind,
            self.action,
            self.record_id.clone(),
            self.payload.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        json!({ "account_id": "acc-1", "notes": "salted walkway" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_new_operation_defaults() {
        let op = PendingOperation::create(EntityKind::PrimaryLog, payload());
        assert_eq!(op.retry_count, 0);
        assert!(op.record_id.is_none());
        assert_eq!(op.action, Action::Create);
        assert!(op.enqueued_at > 1700000000000);
    }

    #[test]
    fn test_temp_ids_are_unique() {
        let a = PendingOperation::create(EntityKind::PrimaryLog, payload());
        let b = PendingOperation::create(EntityKind::PrimaryLog, payload());
        assert_ne!(a.temp_id, b.temp_id);
    }

    #[test]
    fn test_reissue_gets_new_identity() {
        let mut op = PendingOperation::close(EntityKind::SecondaryLog, "rec-9", payload());
        op.retry_count = 3;

        let fresh = op.reissue();
        assert_ne!(fresh.temp_id, op.temp_id);
        assert_eq!(fresh.retry_count, 0);
        assert_eq!(fresh.record_id.as_deref(), Some("rec-9"));
        assert_eq!(fresh.action, Action::Close);
        assert_eq!(fresh.payload, op.payload);
    }

    #[test]
    fn test_serialized_shape() {
        let op = PendingOperation::update(EntityKind::SecondaryLog, "rec-1", payload());
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["entityKind"], "secondary_log");
        assert_eq!(value["action"], "update");
        assert_eq!(value["recordId"], "rec-1");
        assert_eq!(value["retryCount"], 0);
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        assert_eq!(EntityKind::PrimaryLog.storage_key(), "pending_ops:primary_log");
        assert_ne!(
            EntityKind::PrimaryLog.storage_key(),
            EntityKind::SecondaryLog.storage_key()
        );
    }
}
