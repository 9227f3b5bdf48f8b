use std::path::Path;

use tally_core::SyncSettings;

use crate::commands::common::{open_queue, parse_mutation_id};
use crate::error::CliError;

pub fn run_requeue(id: &str, data_dir: &Path, settings: &SyncSettings) -> Result<(), CliError> {
    let id = parse_mutation_id(id)?;
    let mutation = open_queue(data_dir, settings)?.requeue_dead_letter(&id)?;
    println!(
        "Requeued {} ({} on {}/{})",
        mutation.id, mutation.operation, mutation.table_name, mutation.record_id
    );
    Ok(())
}
