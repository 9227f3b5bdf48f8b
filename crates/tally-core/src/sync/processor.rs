//! Replays the queue against the remote backend, one item at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::PendingMutation;
use crate::queue::{DeadLetterPolicy, QueueStore};
use crate::remote::{RemoteBackend, ReplayRequest};
use crate::Result;

/// Tally of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub synced: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// The pass stopped early; remaining items were left untouched.
    pub cancelled: bool,
}

enum ReplayOutcome {
    Applied,
    Failed(String),
    Cancelled,
}

pub struct QueueProcessor {
    queue: QueueStore,
    remote: Arc<dyn RemoteBackend>,
    remote_timeout: Duration,
    dead_letter: DeadLetterPolicy,
}

impl QueueProcessor {
    pub fn new(
        queue: QueueStore,
        remote: Arc<dyn RemoteBackend>,
        remote_timeout: Duration,
        dead_letter: DeadLetterPolicy,
    ) -> Self {
        Self {
            queue,
            remote,
            remote_timeout,
            dead_letter,
        }
    }

    /// Process every queued mutation in ascending priority order.
    ///
    /// Per-item failures are recorded on the item and never abort the pass.
    /// Only local storage failures are returned as errors.
    pub async fn process(&self, cancel: &CancellationToken) -> Result<ProcessReport> {
        let mut items = self.queue.pending()?;
        // Stable: equal priorities keep enqueue order.
        items.sort_by_key(|item| item.priority);

        let mut report = ProcessReport::default();
        for item in &items {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.replay(item, cancel).await {
                ReplayOutcome::Applied => {
                    self.queue.remove(&item.id)?;
                    report.synced += 1;
                    tracing::debug!(
                        "Replayed {} {} on {}/{}",
                        item.id,
                        item.operation,
                        item.table_name,
                        item.record_id
                    );
                }
                ReplayOutcome::Failed(message) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Replay of {} ({} on {}/{}) failed: {}",
                        item.id,
                        item.operation,
                        item.table_name,
                        item.record_id,
                        message
                    );
                    if self.record_failure(item, &message)? {
                        report.dead_lettered += 1;
                    }
                }
                ReplayOutcome::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        tracing::info!(
            "Processed queue: {} synced, {} failed, {} dead-lettered{}",
            report.synced,
            report.failed,
            report.dead_lettered,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    async fn replay(&self, item: &PendingMutation, cancel: &CancellationToken) -> ReplayOutcome {
        let request = match ReplayRequest::from_mutation(item) {
            Ok(request) => request,
            Err(error) => return ReplayOutcome::Failed(format!("invalid payload: {error}")),
        };

        let call = tokio::time::timeout(
            self.remote_timeout,
            self.remote.apply(item.operation, &request),
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => ReplayOutcome::Cancelled,
            result = call => match result {
                Ok(Ok(())) => ReplayOutcome::Applied,
                Ok(Err(error)) => ReplayOutcome::Failed(error.message),
                Err(_) => ReplayOutcome::Failed(format!(
                    "remote call timed out after {} ms",
                    self.remote_timeout.as_millis()
                )),
            },
        }
    }

    /// Returns whether the item was moved to the dead-letter list.
    fn record_failure(&self, item: &PendingMutation, message: &str) -> Result<bool> {
        let Some(updated) = self.queue.record_failure(&item.id, message)? else {
            return Ok(false);
        };
        if !self.dead_letter.is_exhausted(&updated) {
            return Ok(false);
        }
        Ok(self.queue.move_to_dead_letter(&item.id)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MutationOperation, MutationStatus};
    use crate::remote::{RemoteError, RemoteResult};
    use crate::storage::MemoryKeyValueStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(MutationOperation, String)>>,
        failing_records: Vec<String>,
        hang: bool,
    }

    impl RecordingBackend {
        fn failing(records: &[&str]) -> Self {
            Self {
                failing_records: records.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn record(
            &self,
            operation: MutationOperation,
            request: &ReplayRequest,
        ) -> RemoteResult<()> {
            self.calls
                .lock()
                .push((operation, request.record_id.clone()));
            if self.failing_records.contains(&request.record_id) {
                Err(RemoteError::new("rejected by backend"))
            } else {
                Ok(())
            }
        }

        async fn maybe_hang(&self) {
            if self.hang {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl RemoteBackend for RecordingBackend {
        async fn insert(&self, request: &ReplayRequest) -> RemoteResult<()> {
            self.maybe_hang().await;
            self.record(MutationOperation::Create, request)
        }
        async fn update(&self, request: &ReplayRequest) -> RemoteResult<()> {
            self.maybe_hang().await;
            self.record(MutationOperation::Update, request)
        }
        async fn delete(&self, request: &ReplayRequest) -> RemoteResult<()> {
            self.maybe_hang().await;
            self.record(MutationOperation::Delete, request)
        }
    }

    fn setup(
        backend: RecordingBackend,
        policy: DeadLetterPolicy,
    ) -> (QueueStore, Arc<RecordingBackend>, QueueProcessor) {
        let queue = QueueStore::new(Arc::new(MemoryKeyValueStore::new()));
        let backend = Arc::new(backend);
        let processor = QueueProcessor::new(
            queue.clone(),
            backend.clone(),
            Duration::from_secs(5),
            policy,
        );
        (queue, backend, processor)
    }

    #[tokio::test]
    async fn dispatches_by_operation_in_priority_order() {
        let (queue, backend, processor) =
            setup(RecordingBackend::default(), DeadLetterPolicy::default());
        queue
            .enqueue("t", "low", MutationOperation::Delete, &json!(null), 9)
            .unwrap();
        queue
            .enqueue("t", "high", MutationOperation::Create, &json!({"a": 1}), 1)
            .unwrap();
        queue
            .enqueue("t", "mid", MutationOperation::Update, &json!({"a": 2}), 4)
            .unwrap();

        let report = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.synced, 3);
        assert_eq!(
            *backend.calls.lock(),
            vec![
                (MutationOperation::Create, "high".to_string()),
                (MutationOperation::Update, "mid".to_string()),
                (MutationOperation::Delete, "low".to_string()),
            ]
        );
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn failure_keeps_item_and_continues() {
        let (queue, backend, processor) =
            setup(RecordingBackend::failing(&["bad"]), DeadLetterPolicy::default());
        queue
            .enqueue("t", "bad", MutationOperation::Update, &json!({}), 1)
            .unwrap();
        queue
            .enqueue("t", "good", MutationOperation::Update, &json!({}), 2)
            .unwrap();

        let report = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(backend.calls.lock().len(), 2);

        let remaining = queue.pending().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id, "bad");
        assert_eq!(remaining[0].retry_count, 1);
        assert_eq!(remaining[0].status, MutationStatus::Failed);
        assert_eq!(remaining[0].error.as_deref(), Some("rejected by backend"));
    }

    #[tokio::test]
    async fn malformed_payload_counts_as_item_failure() {
        let (queue, backend, processor) =
            setup(RecordingBackend::default(), DeadLetterPolicy::default());
        queue
            .enqueue("t", "r", MutationOperation::Create, &json!("{broken"), 5)
            .unwrap();

        let report = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(backend.calls.lock().is_empty());
        let remaining = queue.pending().unwrap();
        assert!(remaining[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("invalid payload"));
    }

    #[tokio::test]
    async fn exhausted_items_move_to_dead_letter() {
        let (queue, _backend, processor) =
            setup(RecordingBackend::failing(&["bad"]), DeadLetterPolicy::after(2));
        queue
            .enqueue("t", "bad", MutationOperation::Update, &json!({}), 1)
            .unwrap();

        let first = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.dead_lettered, 0);
        assert_eq!(queue.len().unwrap(), 1);

        let second = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(second.dead_lettered, 1);
        assert!(queue.is_empty().unwrap());
        let parked = queue.dead_letters().unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].retry_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_recorded_as_failure() {
        let backend = RecordingBackend {
            hang: true,
            ..RecordingBackend::default()
        };
        let (queue, _backend, processor) = setup(backend, DeadLetterPolicy::default());
        queue
            .enqueue("t", "slow", MutationOperation::Delete, &json!(null), 5)
            .unwrap();

        let report = processor.process(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        let remaining = queue.pending().unwrap();
        assert_eq!(remaining[0].retry_count, 1);
        assert!(remaining[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_pass_leaves_queue_untouched() {
        let (queue, backend, processor) =
            setup(RecordingBackend::default(), DeadLetterPolicy::default());
        let queued = queue
            .enqueue("t", "r", MutationOperation::Create, &json!({}), 5)
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = processor.process(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(backend.calls.lock().is_empty());
        assert_eq!(queue.pending().unwrap(), vec![queued]);
    }
}
