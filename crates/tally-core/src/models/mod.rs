//! Data models for Tally

mod mutation;
mod sync_result;

pub use mutation::{
    encode_payload, MutationId, MutationOperation, MutationStatus, PendingMutation,
    DEFAULT_PRIORITY,
};
pub use sync_result::SyncResult;
