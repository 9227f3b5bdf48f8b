use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Invalid mutation id: {0}")]
    InvalidMutationId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error(
        "Sync is not configured. Set TALLY_BACKEND_URL and TALLY_BACKEND_ANON_KEY, or add backend_url and backend_anon_key to the settings file."
    )]
    SyncNotConfigured,
}
