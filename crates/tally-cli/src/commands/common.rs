use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tally_core::connectivity::{ConnectivityCheck, HttpConnectivity, StaticConnectivity};
use tally_core::remote::RestRemoteBackend;
use tally_core::storage::FileKeyValueStore;
use tally_core::util::unix_millis_now;
use tally_core::{MutationId, PendingMutation, QueueStore, SyncService, SyncSettings};

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct MutationListItem {
    pub id: String,
    pub table_name: String,
    pub record_id: String,
    pub operation: String,
    pub status: String,
    pub priority: i32,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn open_queue(data_dir: &Path, settings: &SyncSettings) -> Result<QueueStore, CliError> {
    let store = FileKeyValueStore::open(data_dir)?;
    Ok(QueueStore::with_key(Arc::new(store), &settings.queue_key)?)
}

pub fn build_sync_service(
    data_dir: &Path,
    settings: &SyncSettings,
) -> Result<SyncService, CliError> {
    let backend_config = settings
        .rest_backend_config()
        .ok_or(CliError::SyncNotConfigured)?;
    let remote = RestRemoteBackend::new(backend_config)?;
    let connectivity: Arc<dyn ConnectivityCheck> = match &settings.connectivity_probe_url {
        Some(url) => Arc::new(HttpConnectivity::new(url.as_str())?),
        None => Arc::new(StaticConnectivity::new(true)),
    };

    Ok(SyncService::new(
        open_queue(data_dir, settings)?,
        connectivity,
        Arc::new(remote),
        settings.sync_options(),
    ))
}

/// Parse a `--data` argument. Deletes and missing payloads become `null`.
pub fn parse_payload(raw: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Value::Null);
    };
    serde_json::from_str(raw).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

pub fn parse_mutation_id(raw: &str) -> Result<MutationId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidMutationId(raw.trim().to_string()))
}

/// Queue items in the order a sync pass would replay them.
pub fn replay_order(mut items: Vec<PendingMutation>) -> Vec<PendingMutation> {
    items.sort_by_key(|item| item.priority);
    items
}

pub fn mutation_to_list_item(mutation: &PendingMutation) -> MutationListItem {
    MutationListItem {
        id: mutation.id.to_string(),
        table_name: mutation.table_name.clone(),
        record_id: mutation.record_id.clone(),
        operation: mutation.operation.as_str().to_string(),
        status: mutation.status.as_str().to_string(),
        priority: mutation.priority,
        retry_count: mutation.retry_count,
        error: mutation.error.clone(),
        created_at: mutation.created_at,
        updated_at: mutation.updated_at,
        relative_time: format_relative_time(mutation.updated_at, unix_millis_now()),
    }
}

pub fn format_mutation_lines(mutations: &[PendingMutation]) -> Vec<String> {
    let now = unix_millis_now();
    mutations
        .iter()
        .map(|mutation| {
            let mut line = format!(
                "{}  p{:<3} {:<6} {}/{}  retries={}  {}",
                mutation.id,
                mutation.priority,
                mutation.operation.as_str(),
                mutation.table_name,
                mutation.record_id,
                mutation.retry_count,
                format_relative_time(mutation.updated_at, now)
            );
            if let Some(error) = &mutation.error {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
