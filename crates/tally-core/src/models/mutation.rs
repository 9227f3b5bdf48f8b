//! Pending mutation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::unix_millis_now;

/// Priority assigned when the caller does not pick one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// A unique identifier for a queued mutation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Create a new unique mutation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MutationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Kind of change replayed against the remote backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

impl MutationOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether replaying this operation needs the stored payload
    pub const fn carries_payload(self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for MutationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown mutation operation '{other}'")),
        }
    }
}

/// Bookkeeping status; never used to gate replay order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    #[default]
    Pending,
    Processing,
    Failed,
}

impl MutationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
        }
    }
}

/// A locally recorded change awaiting replay against the remote backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Unique identifier, assigned at enqueue time
    pub id: MutationId,
    /// Remote collection the mutation targets
    pub table_name: String,
    /// Affected remote record
    pub record_id: String,
    /// Create, update or delete
    pub operation: MutationOperation,
    /// Serialized payload snapshot (ignored for deletes)
    pub data: String,
    pub status: MutationStatus,
    /// Last replay error, if the previous attempt failed
    pub error: Option<String>,
    pub retry_count: u32,
    /// Lower values replay first
    pub priority: i32,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl PendingMutation {
    /// Create a new pending mutation. `data` must already be in stored form.
    #[must_use]
    pub fn new(
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        operation: MutationOperation,
        data: impl Into<String>,
        priority: i32,
    ) -> Self {
        let now = unix_millis_now();
        Self {
            id: MutationId::new(),
            table_name: table_name.into(),
            record_id: record_id.into(),
            operation,
            data: data.into(),
            status: MutationStatus::Pending,
            error: None,
            retry_count: 0,
            priority,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a failed replay attempt.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.error = Some(message.into());
        self.status = MutationStatus::Failed;
        self.updated_at = unix_millis_now().max(self.updated_at);
    }

    /// Reset retry bookkeeping so the item replays as if freshly enqueued.
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
        self.error = None;
        self.status = MutationStatus::Pending;
        self.updated_at = unix_millis_now().max(self.updated_at);
    }

    /// Parse the stored payload back into structured JSON.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Convert a caller payload into its stored string form.
///
/// A JSON string is stored verbatim; any other value is serialized.
pub fn encode_payload(payload: &serde_json::Value) -> Result<String, serde_json::Error> {
    match payload {
        serde_json::Value::String(raw) => Ok(raw.clone()),
        other => serde_json::to_string(other),
    }
}
