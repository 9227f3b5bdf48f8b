//! Observer list for sync status transitions.
//!
//! Listeners run synchronously on the emitting task. Emission iterates a
//! snapshot taken under the lock, and the lock is released before any callback
//! runs, so callbacks may subscribe or unsubscribe freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::SyncResult;

pub type StatusListener = dyn Fn(&SyncResult) + Send + Sync;

#[derive(Default)]
struct Registry {
    listeners: Mutex<Vec<(u64, Arc<StatusListener>)>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}

#[derive(Clone, Default)]
pub struct StatusListeners {
    registry: Arc<Registry>,
}

impl StatusListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every subsequent transition.
    pub fn add_listener(
        &self,
        callback: impl Fn(&SyncResult) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .lock()
            .push((id, Arc::new(callback)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn emit(&self, update: &SyncResult) {
        let snapshot: Vec<Arc<StatusListener>> = self
            .registry
            .listeners
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(update);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`StatusListeners::add_listener`].
///
/// Dropping the handle keeps the listener registered.
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Calling this again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SyncStatus;

    #[test]
    fn emit_reaches_every_listener() {
        let listeners = StatusListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            listeners.add_listener(move |update| seen.lock().push(update.status));
        }
        listeners.emit(&SyncResult::with_status(SyncStatus::Syncing, None));

        assert_eq!(*seen.lock(), vec![SyncStatus::Syncing, SyncStatus::Syncing]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let listeners = StatusListeners::new();
        let first = listeners.add_listener(|_| {});
        let _second = listeners.add_listener(|_| {});
        assert_eq!(listeners.len(), 2);

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn late_listener_gets_no_replay() {
        let listeners = StatusListeners::new();
        listeners.emit(&SyncResult::with_status(SyncStatus::Success, Some(1)));

        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        listeners.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let listeners = StatusListeners::new();
        let subscription = listeners.add_listener(|_| {});
        drop(listeners);
        subscription.unsubscribe();
    }
}
