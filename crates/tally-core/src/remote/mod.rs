//! Remote backend surface the queue replays against.

mod rest;

pub use rest::{RestBackendConfig, RestRemoteBackend};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{MutationOperation, PendingMutation};

/// Failure reported by the remote backend for a single operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        Self::new(format!("HTTP request failed: {error}"))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One row-level operation to apply remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRequest {
    pub table_name: String,
    pub record_id: String,
    /// Client-generated key the backend can use to drop duplicate replays.
    pub idempotency_key: String,
    /// Structured payload; `Value::Null` for deletes.
    pub payload: Value,
}

impl ReplayRequest {
    /// Build a request from a queued mutation, parsing its stored payload.
    pub fn from_mutation(mutation: &PendingMutation) -> Result<Self, serde_json::Error> {
        let payload = if mutation.operation.carries_payload() {
            mutation.payload()?
        } else {
            Value::Null
        };
        Ok(Self {
            table_name: mutation.table_name.clone(),
            record_id: mutation.record_id.clone(),
            idempotency_key: mutation.id.to_string(),
            payload,
        })
    }
}

/// Row-level insert/update/delete against named tables.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn insert(&self, request: &ReplayRequest) -> RemoteResult<()>;
    async fn update(&self, request: &ReplayRequest) -> RemoteResult<()>;
    async fn delete(&self, request: &ReplayRequest) -> RemoteResult<()>;

    /// Dispatch on the operation kind.
    async fn apply(
        &self,
        operation: MutationOperation,
        request: &ReplayRequest,
    ) -> RemoteResult<()> {
        match operation {
            MutationOperation::Create => self.insert(request).await,
            MutationOperation::Update => self.update(request).await,
            MutationOperation::Delete => self.delete(request).await,
        }
    }
}
