use std::path::Path;

use tally_core::{MutationOperation, SyncSettings};

use crate::commands::common::{open_queue, parse_payload};
use crate::error::CliError;

pub fn run_enqueue(
    table: &str,
    record_id: &str,
    operation: MutationOperation,
    data: Option<&str>,
    priority: i32,
    data_dir: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let payload = if operation.carries_payload() {
        parse_payload(data)?
    } else {
        serde_json::Value::Null
    };

    let queue = open_queue(data_dir, settings)?;
    let mutation = queue.enqueue(table, record_id, operation, &payload, priority)?;
    println!("{}", mutation.id);
    Ok(())
}
