//! Remote backend of record.
//!
//! The engine only needs two primitives per kind: insert a new row and
//! partially update an existing one. [`RestBackend`] speaks a PostgREST-style
//! HTTP API; tests substitute their own [`RemoteBackend`].

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::types::{EntityKind, Payload};
use crate::config::BackendConfig;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Operation {0} has no record id")]
    MissingRecordId(String),
}

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert(&self, kind: EntityKind, fields: &Payload) -> Result<(), BackendError>;

    async fn update(
        &self,
        kind: EntityKind,
        record_id: &str,
        fields: &Payload,
    ) -> Result<(), BackendError>;
}

pub struct RestBackend {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    primary_collection: String,
    secondary_collection: String,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            primary_collection: config.primary_collection.clone(),
            secondary_collection: config.secondary_collection.clone(),
        }
    }

    fn collection(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::PrimaryLog => &self.primary_collection,
            EntityKind::SecondaryLog => &self.secondary_collection,
        }
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.collection(kind))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<(), BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn insert(&self, kind: EntityKind, fields: &Payload) -> Result<(), BackendError> {
        let response = self
            .authorize(self.http.post(self.collection_url(kind)))
            .header("Prefer", "return=minimal")
            .json(fields)
            .send()
            .await?;

        Self::check(response).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        record_id: &str,
        fields: &Payload,
    ) -> Result<(), BackendError> {
        let filter = format!("eq.{}", record_id);
        let response = self
            .authorize(self.http.patch(self.collection_url(kind)))
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(fields)
            .send()
            .await?;

        Self::check(response).await
    }
}
