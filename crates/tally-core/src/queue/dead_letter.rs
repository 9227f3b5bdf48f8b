//! Holding area for mutations that exhausted their retry budget.

use serde::{Deserialize, Serialize};

use super::{QueueSnapshot, QueueStore};
use crate::models::{MutationId, PendingMutation};
use crate::{Error, Result};

/// When to stop retrying a failing mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterPolicy {
    /// Failures after which an item leaves the queue. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl DeadLetterPolicy {
    pub const fn unbounded() -> Self {
        Self { max_retries: None }
    }

    pub const fn after(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }

    pub fn is_exhausted(&self, mutation: &PendingMutation) -> bool {
        self.max_retries
            .is_some_and(|max| mutation.retry_count >= max.max(1))
    }
}

impl QueueStore {
    /// Mutations parked after exceeding the retry budget, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<PendingMutation>> {
        let snapshot = self.read_list(&self.dead_letter_key)?;
        if let QueueSnapshot::Unreadable { reason, .. } = &snapshot {
            tracing::warn!(
                "Dead-letter list under '{}' is unreadable, treating as empty: {}",
                self.dead_letter_key,
                reason
            );
        }
        Ok(snapshot.into_items())
    }

    /// Move a queued mutation to the dead-letter list.
    ///
    /// The dead-letter write lands before the queue write, so an interruption
    /// leaves a duplicate rather than losing the item.
    pub fn move_to_dead_letter(&self, id: &MutationId) -> Result<Option<PendingMutation>> {
        let _guard = self.write_lock.lock();
        let mut queue = self.read_for_write(&self.key)?;
        let Some(position) = queue.iter().position(|item| item.id == *id) else {
            return Ok(None);
        };
        let item = queue.remove(position);

        let mut parked = self.read_for_write(&self.dead_letter_key)?;
        parked.retain(|existing| existing.id != item.id);
        parked.push(item.clone());
        self.write_list(&self.dead_letter_key, &parked)?;
        self.write_list(&self.key, &queue)?;

        tracing::warn!(
            "Moved {} ({} on {}/{}) to dead-letter after {} failed attempts",
            item.id,
            item.operation,
            item.table_name,
            item.record_id,
            item.retry_count
        );
        Ok(Some(item))
    }

    /// Put a dead-lettered mutation back on the queue with a fresh retry budget.
    pub fn requeue_dead_letter(&self, id: &MutationId) -> Result<PendingMutation> {
        let _guard = self.write_lock.lock();
        let mut parked = self.read_for_write(&self.dead_letter_key)?;
        let position = parked
            .iter()
            .position(|item| item.id == *id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut item = parked.remove(position);
        item.reset_retries();

        let mut queue = self.read_for_write(&self.key)?;
        if !queue.iter().any(|existing| existing.id == item.id) {
            queue.push(item.clone());
        }
        self.write_list(&self.key, &queue)?;
        self.write_list(&self.dead_letter_key, &parked)?;
        Ok(item)
    }

    /// Discard every dead-lettered mutation. Returns how many were dropped.
    pub fn purge_dead_letters(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let count = self.read_list(&self.dead_letter_key)?.into_items().len();
        self.kv.remove(&self.dead_letter_key)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MutationOperation, MutationStatus};
    use crate::storage::MemoryKeyValueStore;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> QueueStore {
        QueueStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let mut item = PendingMutation::new("t", "r", MutationOperation::Create, "{}", 5);
        item.retry_count = u32::MAX;
        assert!(!DeadLetterPolicy::unbounded().is_exhausted(&item));
    }

    #[test]
    fn bounded_policy_exhausts_at_threshold() {
        let policy = DeadLetterPolicy::after(3);
        let mut item = PendingMutation::new("t", "r", MutationOperation::Create, "{}", 5);
        item.retry_count = 2;
        assert!(!policy.is_exhausted(&item));
        item.retry_count = 3;
        assert!(policy.is_exhausted(&item));
    }

    #[test]
    fn move_and_requeue_roundtrip() {
        let queue = setup();
        let item = queue
            .enqueue("goals", "g-1", MutationOperation::Update, &json!({"x": 1}), 2)
            .unwrap();
        queue.record_failure(&item.id, "HTTP 409").unwrap();

        let parked = queue.move_to_dead_letter(&item.id).unwrap().unwrap();
        assert_eq!(parked.retry_count, 1);
        assert!(queue.is_empty().unwrap());
        assert_eq!(queue.dead_letters().unwrap().len(), 1);

        let requeued = queue.requeue_dead_letter(&item.id).unwrap();
        assert_eq!(requeued.retry_count, 0);
        assert_eq!(requeued.status, MutationStatus::Pending);
        assert!(requeued.error.is_none());
        assert_eq!(queue.pending().unwrap(), vec![requeued]);
        assert!(queue.dead_letters().unwrap().is_empty());
    }

    #[test]
    fn move_unknown_id_is_noop() {
        let queue = setup();
        assert!(queue.move_to_dead_letter(&MutationId::new()).unwrap().is_none());
        let err = queue.requeue_dead_letter(&MutationId::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn purge_reports_count() {
        let queue = setup();
        for record in ["a", "b"] {
            let item = queue
                .enqueue("t", record, MutationOperation::Delete, &json!(null), 5)
                .unwrap();
            queue.move_to_dead_letter(&item.id).unwrap();
        }
        assert_eq!(queue.purge_dead_letters().unwrap(), 2);
        assert!(queue.dead_letters().unwrap().is_empty());
    }
}
