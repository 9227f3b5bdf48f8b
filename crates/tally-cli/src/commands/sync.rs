use std::path::Path;

use tally_core::{SyncResult, SyncService, SyncSettings, SyncStatus};
use tokio_util::sync::CancellationToken;

use crate::commands::common::{build_sync_service, format_sync_timestamp};
use crate::error::CliError;

pub async fn run_sync(
    force: bool,
    data_dir: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let service = build_sync_service(data_dir, settings)?;
    let result = sync_until_interrupted(&service, force).await;
    report_sync_result(&result)
}

/// Run one pass, cancelling it on Ctrl-C.
pub async fn sync_until_interrupted(service: &SyncService, force: bool) -> SyncResult {
    let subscription = service.add_listener(|update| {
        tracing::debug!("Sync status changed to {}", update.status);
    });

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted; stopping after the current item");
                cancel.cancel();
            }
        })
    };

    let result = service.sync_with_cancel(force, &cancel).await;
    watcher.abort();
    subscription.unsubscribe();
    result
}

pub fn report_sync_result(result: &SyncResult) -> Result<(), CliError> {
    for line in sync_report_lines(result)? {
        println!("{line}");
    }
    Ok(())
}

/// Lines printed for a finished `sync` call; error outcomes become `SyncFailed`.
pub fn sync_report_lines(result: &SyncResult) -> Result<Vec<String>, CliError> {
    let mut lines = Vec::new();
    match result.status {
        SyncStatus::Success => {
            // Counts are only set by the pass that did the work.
            let Some(synced) = result.synced_count else {
                lines.push("Another sync pass is in progress; nothing replayed".to_string());
                return Ok(lines);
            };
            lines.push(format!(
                "Sync completed: {} synced, {} failed, {} dead-lettered",
                synced,
                result.failed_count.unwrap_or(0),
                result.dead_lettered_count.unwrap_or(0)
            ));
            if let Some(at) = result.last_synced_at {
                lines.push(format!("Last synced at {}", format_sync_timestamp(at)));
            }
        }
        SyncStatus::Syncing => lines.push("A sync pass is already running".to_string()),
        SyncStatus::Error => {
            return Err(CliError::SyncFailed(
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        SyncStatus::Idle => {}
    }
    Ok(lines)
}
