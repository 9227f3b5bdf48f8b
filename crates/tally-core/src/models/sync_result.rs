//! Sync pass result model

use serde::{Deserialize, Serialize};

use crate::state::SyncStatus;

/// Outcome of one orchestration pass (not persisted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    /// Error message when `status` is `Error`
    pub error: Option<String>,
    /// Completion time of the last successful pass (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Items replayed and removed during this pass
    pub synced_count: Option<usize>,
    /// Items that failed and stayed queued
    pub failed_count: Option<usize>,
    /// Items moved to the dead-letter list
    pub dead_lettered_count: Option<usize>,
}

impl SyncResult {
    pub const fn with_status(status: SyncStatus, last_synced_at: Option<i64>) -> Self {
        Self {
            status,
            error: None,
            last_synced_at,
            synced_count: None,
            failed_count: None,
            dead_lettered_count: None,
        }
    }

    pub fn error(message: impl Into<String>, last_synced_at: Option<i64>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::with_status(SyncStatus::Error, last_synced_at)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}
