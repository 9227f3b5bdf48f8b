//! Sync orchestrator: connectivity gate, queue replay, remote pull.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::listeners::{StatusListeners, Subscription};
use super::processor::{ProcessReport, QueueProcessor};
use super::pull::{NoopPuller, RemoteChangePuller};
use super::SyncOptions;
use crate::connectivity::ConnectivityCheck;
use crate::models::{MutationOperation, PendingMutation, SyncResult};
use crate::queue::QueueStore;
use crate::remote::RemoteBackend;
use crate::state::SyncStatus;
use crate::util::unix_millis_now;
use crate::Result;

pub const OFFLINE_MESSAGE: &str = "no connectivity";
pub const CANCELLED_MESSAGE: &str = "sync cancelled";

#[derive(Debug, Default)]
struct ServiceState {
    status: SyncStatus,
    error: Option<String>,
    last_synced_at: Option<i64>,
}

/// Releases the in-flight slot on every exit path.
struct PassGuard<'a> {
    active: &'a AtomicUsize,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SyncService {
    queue: QueueStore,
    connectivity: Arc<dyn ConnectivityCheck>,
    processor: QueueProcessor,
    puller: Arc<dyn RemoteChangePuller>,
    listeners: StatusListeners,
    state: Mutex<ServiceState>,
    active_passes: AtomicUsize,
}

impl SyncService {
    pub fn new(
        queue: QueueStore,
        connectivity: Arc<dyn ConnectivityCheck>,
        remote: Arc<dyn RemoteBackend>,
        options: SyncOptions,
    ) -> Self {
        Self::with_puller(queue, connectivity, remote, Arc::new(NoopPuller), options)
    }

    pub fn with_puller(
        queue: QueueStore,
        connectivity: Arc<dyn ConnectivityCheck>,
        remote: Arc<dyn RemoteBackend>,
        puller: Arc<dyn RemoteChangePuller>,
        options: SyncOptions,
    ) -> Self {
        let processor = QueueProcessor::new(
            queue.clone(),
            remote,
            options.remote_timeout,
            options.dead_letter,
        );
        Self {
            queue,
            connectivity,
            processor,
            puller,
            listeners: StatusListeners::new(),
            state: Mutex::new(ServiceState::default()),
            active_passes: AtomicUsize::new(0),
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Queue a local mutation for the next pass.
    pub fn enqueue(
        &self,
        table_name: &str,
        record_id: &str,
        operation: MutationOperation,
        payload: &Value,
        priority: i32,
    ) -> Result<PendingMutation> {
        self.queue
            .enqueue(table_name, record_id, operation, payload, priority)
    }

    pub fn status(&self) -> SyncStatus {
        self.state.lock().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn last_synced_at(&self) -> Option<i64> {
        self.state.lock().last_synced_at
    }

    pub fn is_syncing(&self) -> bool {
        self.active_passes.load(Ordering::Acquire) > 0
    }

    pub fn add_listener(
        &self,
        callback: impl Fn(&SyncResult) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add_listener(callback)
    }

    /// Run one pass unless another is in flight.
    ///
    /// With `force_sync` a pass starts even when one is already running.
    pub async fn sync(&self, force_sync: bool) -> SyncResult {
        self.sync_with_cancel(force_sync, &CancellationToken::new())
            .await
    }

    pub async fn sync_with_cancel(
        &self,
        force_sync: bool,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let Some(_guard) = self.begin_pass(force_sync) else {
            tracing::debug!("Sync already in progress; returning current status");
            let state = self.state.lock();
            return SyncResult {
                error: state.error.clone(),
                ..SyncResult::with_status(state.status, state.last_synced_at)
            };
        };

        if !self.connectivity.is_online().await {
            tracing::info!("Skipping sync pass: offline");
            return self.fail(OFFLINE_MESSAGE.to_string());
        }

        self.transition(SyncStatus::Syncing, None);
        match self.run_pass(cancel).await {
            Ok(report) if report.cancelled => self.fail(CANCELLED_MESSAGE.to_string()),
            Ok(report) => self.succeed(report),
            Err(error) => {
                tracing::error!("Sync pass failed: {}", error);
                self.fail(error.to_string())
            }
        }
    }

    fn begin_pass(&self, force_sync: bool) -> Option<PassGuard<'_>> {
        if force_sync {
            self.active_passes.fetch_add(1, Ordering::AcqRel);
        } else if self
            .active_passes
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(PassGuard {
            active: &self.active_passes,
        })
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> Result<ProcessReport> {
        let report = self.processor.process(cancel).await?;
        if report.cancelled {
            return Ok(report);
        }
        self.puller.pull_changes().await?;
        Ok(report)
    }

    fn succeed(&self, report: ProcessReport) -> SyncResult {
        let now = unix_millis_now();
        let result = SyncResult {
            synced_count: Some(report.synced),
            failed_count: Some(report.failed),
            dead_lettered_count: Some(report.dead_lettered),
            ..SyncResult::with_status(SyncStatus::Success, Some(now))
        };
        {
            let mut state = self.state.lock();
            state.status = SyncStatus::Success;
            state.error = None;
            state.last_synced_at = Some(now);
        }
        self.listeners.emit(&result);
        result
    }

    fn fail(&self, message: String) -> SyncResult {
        self.transition(SyncStatus::Error, Some(message))
    }

    fn transition(&self, status: SyncStatus, error: Option<String>) -> SyncResult {
        let result = {
            let mut state = self.state.lock();
            state.status = status;
            state.error.clone_from(&error);
            SyncResult {
                error,
                ..SyncResult::with_status(status, state.last_synced_at)
            }
        };
        // Lock released before callbacks run so listeners may query the service.
        self.listeners.emit(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticConnectivity;
    use crate::queue::DeadLetterPolicy;
    use crate::remote::{RemoteError, RemoteResult, ReplayRequest};
    use crate::storage::MemoryKeyValueStore;
    use crate::Error;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct GatedBackend {
        calls: Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
    }

    #[async_trait]
    impl RemoteBackend for GatedBackend {
        async fn insert(&self, request: &ReplayRequest) -> RemoteResult<()> {
            self.calls.lock().push(request.record_id.clone());
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(())
        }
        async fn update(&self, _request: &ReplayRequest) -> RemoteResult<()> {
            Err(RemoteError::new("update unsupported"))
        }
        async fn delete(&self, _request: &ReplayRequest) -> RemoteResult<()> {
            Ok(())
        }
    }

    /// Connectivity check that parks until `gate` is notified.
    #[derive(Default)]
    struct GatedConnectivity {
        entered: Notify,
        gate: Notify,
        online: AtomicBool,
    }

    #[async_trait]
    impl ConnectivityCheck for GatedConnectivity {
        async fn is_online(&self) -> bool {
            self.entered.notify_one();
            self.gate.notified().await;
            self.online.load(Ordering::Acquire)
        }
    }

    struct FailingPuller;

    #[async_trait]
    impl RemoteChangePuller for FailingPuller {
        async fn pull_changes(&self) -> Result<()> {
            Err(Error::Remote("pull rejected".to_string()))
        }
    }

    fn service(backend: Arc<GatedBackend>, online: bool) -> (SyncService, StaticConnectivity) {
        let connectivity = StaticConnectivity::new(online);
        let service = SyncService::new(
            QueueStore::new(Arc::new(MemoryKeyValueStore::new())),
            Arc::new(connectivity.clone()),
            backend,
            SyncOptions::default(),
        );
        (service, connectivity)
    }

    #[tokio::test]
    async fn starts_idle() {
        let (service, _) = service(Arc::default(), true);
        assert_eq!(service.status(), SyncStatus::Idle);
        assert_eq!(service.last_synced_at(), None);
        assert!(!service.is_syncing());
    }

    #[tokio::test]
    async fn offline_pass_reports_error_and_keeps_queue() {
        let (service, connectivity) = service(Arc::default(), false);
        let queued = service
            .enqueue("budgets", "b-1", MutationOperation::Create, &json!({}), 5)
            .unwrap();

        let result = service.sync(false).await;
        assert_eq!(result.status, SyncStatus::Error);
        assert_eq!(result.error.as_deref(), Some(OFFLINE_MESSAGE));
        assert_eq!(service.queue().pending().unwrap(), vec![queued]);

        connectivity.set_online(true);
        let result = service.sync(false).await;
        assert!(result.is_success());
        assert_eq!(service.last_error(), None);
    }

    #[tokio::test]
    async fn success_records_counts_and_timestamp() {
        let (service, _) = service(Arc::default(), true);
        service
            .enqueue("budgets", "ok", MutationOperation::Create, &json!({}), 5)
            .unwrap();
        service
            .enqueue("budgets", "bad", MutationOperation::Update, &json!({}), 5)
            .unwrap();

        let result = service.sync(false).await;
        assert_eq!(result.status, SyncStatus::Success);
        assert_eq!(result.synced_count, Some(1));
        assert_eq!(result.failed_count, Some(1));
        assert_eq!(result.dead_lettered_count, Some(0));
        assert!(result.last_synced_at.is_some());
        assert_eq!(service.last_synced_at(), result.last_synced_at);
        assert!(!service.is_syncing());
    }

    #[tokio::test]
    async fn pull_failure_ends_in_error_and_releases_guard() {
        let service = SyncService::with_puller(
            QueueStore::new(Arc::new(MemoryKeyValueStore::new())),
            Arc::new(StaticConnectivity::new(true)),
            Arc::new(GatedBackend::default()),
            Arc::new(FailingPuller),
            SyncOptions::default(),
        );

        let result = service.sync(false).await;
        assert_eq!(result.status, SyncStatus::Error);
        assert_eq!(result.error.as_deref(), Some("Remote error: pull rejected"));
        assert!(!service.is_syncing());
        assert_eq!(service.sync(false).await.status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn second_call_during_pass_returns_current_status() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(GatedBackend {
            gate: Some(gate.clone()),
            ..GatedBackend::default()
        });
        let (service, _) = service(backend.clone(), true);
        service
            .enqueue("goals", "g-1", MutationOperation::Create, &json!({}), 5)
            .unwrap();

        let (first, second) = tokio::join!(service.sync(false), async {
            backend.started.notified().await;
            let second = service.sync(false).await;
            gate.notify_one();
            second
        });

        assert_eq!(second.status, SyncStatus::Syncing);
        assert_eq!(first.status, SyncStatus::Success);
        assert_eq!(*backend.calls.lock(), vec!["g-1".to_string()]);
    }

    #[tokio::test]
    async fn overlapping_call_after_failure_carries_last_error() {
        let connectivity = Arc::new(GatedConnectivity::default());
        let service = SyncService::new(
            QueueStore::new(Arc::new(MemoryKeyValueStore::new())),
            connectivity.clone(),
            Arc::new(GatedBackend::default()),
            SyncOptions::default(),
        );

        connectivity.gate.notify_one();
        let failed = service.sync(false).await;
        assert_eq!(failed.error.as_deref(), Some(OFFLINE_MESSAGE));
        connectivity.entered.notified().await;

        let (first, second) = tokio::join!(service.sync(false), async {
            connectivity.entered.notified().await;
            let second = service.sync(false).await;
            connectivity.gate.notify_one();
            second
        });

        assert_eq!(second.status, SyncStatus::Error);
        assert_eq!(second.error.as_deref(), Some(OFFLINE_MESSAGE));
        assert_eq!(second.synced_count, None);
        assert_eq!(first.error.as_deref(), Some(OFFLINE_MESSAGE));
        assert!(!service.is_syncing());
    }

    #[tokio::test]
    async fn cancellation_ends_in_error() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(GatedBackend {
            gate: Some(gate),
            ..GatedBackend::default()
        });
        let (service, _) = service(backend.clone(), true);
        service
            .enqueue("goals", "g-1", MutationOperation::Create, &json!({}), 5)
            .unwrap();

        let cancel = CancellationToken::new();
        let (result, ()) = tokio::join!(service.sync_with_cancel(false, &cancel), async {
            backend.started.notified().await;
            cancel.cancel();
        });

        assert_eq!(result.status, SyncStatus::Error);
        assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(service.queue().len().unwrap(), 1);
        assert!(!service.is_syncing());
    }

    #[tokio::test]
    async fn listeners_see_syncing_then_outcome() {
        let (service, _) = service(Arc::default(), true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.add_listener(move |update| sink.lock().push(update.status));

        service.sync(false).await;
        assert_eq!(*seen.lock(), vec![SyncStatus::Syncing, SyncStatus::Success]);
    }

    #[tokio::test]
    async fn dead_letter_policy_flows_from_options() {
        let service = SyncService::new(
            QueueStore::new(Arc::new(MemoryKeyValueStore::new())),
            Arc::new(StaticConnectivity::new(true)),
            Arc::new(GatedBackend::default()),
            SyncOptions {
                remote_timeout: Duration::from_secs(1),
                dead_letter: DeadLetterPolicy::after(1),
            },
        );
        service
            .enqueue("goals", "g-1", MutationOperation::Update, &json!({}), 5)
            .unwrap();

        let result = service.sync(false).await;
        assert_eq!(result.dead_lettered_count, Some(1));
        assert!(service.queue().is_empty().unwrap());
        assert_eq!(service.queue().dead_letters().unwrap().len(), 1);
    }
}
