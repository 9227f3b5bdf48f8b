//! Durable queue of pending mutations stored under a fixed key.
//!
//! The whole queue is one JSON array in the [`KeyValueStore`]. Reads never
//! fail on malformed data: an unparseable value is reported as
//! [`QueueSnapshot::Unreadable`] so callers can choose between resetting and
//! alerting. Every read-modify-write runs under an in-process lock, so enqueues
//! and sync-pass write-backs from the same process never drop each other's
//! changes.

mod dead_letter;

pub use dead_letter::DeadLetterPolicy;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::models::{encode_payload, MutationId, MutationOperation, PendingMutation};
use crate::storage::KeyValueStore;
use crate::util::{normalize_text_option, unix_millis_now};
use crate::{Error, Result};

/// Storage key holding the pending queue.
pub const DEFAULT_QUEUE_KEY: &str = "tally.sync_queue";

/// Result of reading a persisted mutation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSnapshot {
    /// Nothing stored yet, or an empty list.
    Empty,
    /// Items in stored (insertion) order.
    Items(Vec<PendingMutation>),
    /// A value exists but could not be parsed.
    Unreadable { raw: String, reason: String },
}

impl QueueSnapshot {
    /// Items for read purposes; an unreadable value counts as empty.
    pub fn into_items(self) -> Vec<PendingMutation> {
        match self {
            Self::Items(items) => items,
            Self::Empty | Self::Unreadable { .. } => Vec::new(),
        }
    }

    pub const fn is_unreadable(&self) -> bool {
        matches!(self, Self::Unreadable { .. })
    }
}

/// Offline mutation queue over a key-value store.
#[derive(Clone)]
pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    dead_letter_key: String,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("key", &self.key)
            .field("dead_letter_key", &self.dead_letter_key)
            .finish_non_exhaustive()
    }
}

impl QueueStore {
    /// Create a queue stored under [`DEFAULT_QUEUE_KEY`].
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: DEFAULT_QUEUE_KEY.to_string(),
            dead_letter_key: dead_letter_key_for(DEFAULT_QUEUE_KEY),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a queue stored under a custom key.
    pub fn with_key(kv: Arc<dyn KeyValueStore>, key: &str) -> Result<Self> {
        let key = crate::storage::validate_key(key)?.to_string();
        Ok(Self {
            kv,
            dead_letter_key: dead_letter_key_for(&key),
            key,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dead_letter_key(&self) -> &str {
        &self.dead_letter_key
    }

    /// Read the queue, distinguishing empty from unreadable.
    pub fn load(&self) -> Result<QueueSnapshot> {
        self.read_list(&self.key)
    }

    /// Read the queue, degrading an unreadable value to an empty list.
    pub fn pending(&self) -> Result<Vec<PendingMutation>> {
        let snapshot = self.load()?;
        if let QueueSnapshot::Unreadable { reason, .. } = &snapshot {
            tracing::warn!(
                "Stored queue under '{}' is unreadable, treating as empty: {}",
                self.key,
                reason
            );
        }
        Ok(snapshot.into_items())
    }

    /// Overwrite the stored queue.
    pub fn save(&self, items: &[PendingMutation]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_list(&self.key, items)
    }

    /// Number of pending mutations.
    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append a new pending mutation and persist it.
    pub fn enqueue(
        &self,
        table_name: &str,
        record_id: &str,
        operation: MutationOperation,
        payload: &Value,
        priority: i32,
    ) -> Result<PendingMutation> {
        let table_name = normalize_text_option(Some(table_name.to_string()))
            .ok_or_else(|| Error::InvalidInput("Table name cannot be empty".to_string()))?;
        let record_id = normalize_text_option(Some(record_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("Record id cannot be empty".to_string()))?;
        let data = encode_payload(payload)?;

        let mutation = PendingMutation::new(table_name, record_id, operation, data, priority);
        self.modify(|items| {
            items.push(mutation.clone());
            Ok(())
        })?;

        tracing::debug!(
            "Queued {} on {}/{} as {} (priority {})",
            mutation.operation,
            mutation.table_name,
            mutation.record_id,
            mutation.id,
            mutation.priority
        );
        Ok(mutation)
    }

    /// Look up a queued mutation by id.
    pub fn get(&self, id: &MutationId) -> Result<Option<PendingMutation>> {
        Ok(self.pending()?.into_iter().find(|item| item.id == *id))
    }

    /// Remove a mutation after a successful replay. Returns whether it was present.
    pub fn remove(&self, id: &MutationId) -> Result<bool> {
        self.modify(|items| {
            let before = items.len();
            items.retain(|item| item.id != *id);
            Ok(items.len() != before)
        })
    }

    /// Record a failed replay on the stored item, leaving it queued.
    pub fn record_failure(
        &self,
        id: &MutationId,
        message: &str,
    ) -> Result<Option<PendingMutation>> {
        self.modify(|items| {
            Ok(items.iter_mut().find(|item| item.id == *id).map(|item| {
                item.mark_failed(message);
                item.clone()
            }))
        })
    }

    /// Drop every pending mutation.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.kv.remove(&self.key)
    }

    /// Replace an unreadable stored value with an empty queue.
    ///
    /// The unreadable value is copied to a `<key>.corrupt-<ms>` entry first.
    /// Returns `false` when the queue was readable and nothing changed.
    pub fn reset_unreadable(&self) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match self.read_list(&self.key)? {
            QueueSnapshot::Unreadable { raw, .. } => {
                self.quarantine(&self.key, &raw)?;
                self.write_list(&self.key, &[])?;
                Ok(true)
            }
            QueueSnapshot::Empty | QueueSnapshot::Items(_) => Ok(false),
        }
    }

    fn modify<T>(&self, apply: impl FnOnce(&mut Vec<PendingMutation>) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let mut items = self.read_for_write(&self.key)?;
        let output = apply(&mut items)?;
        self.write_list(&self.key, &items)?;
        Ok(output)
    }

    fn read_list(&self, key: &str) -> Result<QueueSnapshot> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(QueueSnapshot::Empty);
        };
        if raw.trim().is_empty() {
            return Ok(QueueSnapshot::Empty);
        }

        match serde_json::from_str::<Vec<PendingMutation>>(&raw) {
            Ok(items) if items.is_empty() => Ok(QueueSnapshot::Empty),
            Ok(items) => Ok(QueueSnapshot::Items(items)),
            Err(error) => Ok(QueueSnapshot::Unreadable {
                raw,
                reason: error.to_string(),
            }),
        }
    }

    /// Read a list for modification. An unreadable value is quarantined so the
    /// write that follows does not destroy it.
    fn read_for_write(&self, key: &str) -> Result<Vec<PendingMutation>> {
        match self.read_list(key)? {
            QueueSnapshot::Empty => Ok(Vec::new()),
            QueueSnapshot::Items(items) => Ok(items),
            QueueSnapshot::Unreadable { raw, reason } => {
                tracing::warn!(
                    "Stored list under '{}' is unreadable ({}); quarantining before overwrite",
                    key,
                    reason
                );
                self.quarantine(key, &raw)?;
                Ok(Vec::new())
            }
        }
    }

    fn write_list(&self, key: &str, items: &[PendingMutation]) -> Result<()> {
        let serialized = serde_json::to_string(items)?;
        self.kv.set(key, &serialized)
    }

    fn quarantine(&self, key: &str, raw: &str) -> Result<()> {
        let backup_key = format!("{key}.corrupt-{}", unix_millis_now());
        self.kv.set(&backup_key, raw)?;
        tracing::warn!("Preserved unreadable value of '{}' as '{}'", key, backup_key);
        Ok(())
    }
}

fn dead_letter_key_for(key: &str) -> String {
    format!("{key}.dead_letter")
}
