//! Sync engine: replays queued mutations and reports status to observers.

mod listeners;
mod processor;
mod pull;
mod service;

pub use listeners::{StatusListener, StatusListeners, Subscription};
pub use processor::{ProcessReport, QueueProcessor};
pub use pull::{NoopPuller, RemoteChangePuller};
pub use service::{SyncService, CANCELLED_MESSAGE, OFFLINE_MESSAGE};

use std::time::Duration;

use crate::queue::DeadLetterPolicy;

pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 15;

/// Tuning knobs for a [`SyncService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for a single remote call; expiry counts as an item failure.
    pub remote_timeout: Duration,
    pub dead_letter: DeadLetterPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            dead_letter: DeadLetterPolicy::unbounded(),
        }
    }
}
