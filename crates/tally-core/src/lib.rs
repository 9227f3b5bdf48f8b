//! tally-core - Core library for Tally
//!
//! This crate contains the offline mutation queue, the sync engine that
//! replays it against the hosted backend, and the models shared by every
//! Tally interface (mobile, CLI).

pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{MutationId, MutationOperation, MutationStatus, PendingMutation, SyncResult};
pub use queue::{DeadLetterPolicy, QueueSnapshot, QueueStore};
pub use state::SyncStatus;
pub use sync::{SyncOptions, SyncService};
