use std::path::Path;

use tally_core::{QueueSnapshot, SyncSettings};

use crate::commands::common::{
    format_mutation_lines, mutation_to_list_item, open_queue, replay_order, MutationListItem,
};
use crate::error::CliError;

pub fn run_list(as_json: bool, data_dir: &Path, settings: &SyncSettings) -> Result<(), CliError> {
    let queue = open_queue(data_dir, settings)?;
    let items = match queue.load()? {
        QueueSnapshot::Unreadable { reason, .. } => {
            eprintln!(
                "Stored queue is unreadable ({reason}). Run `tally reset --unreadable-only` to start over."
            );
            Vec::new()
        }
        snapshot => replay_order(snapshot.into_items()),
    };

    if as_json {
        let json_items = items
            .iter()
            .map(mutation_to_list_item)
            .collect::<Vec<MutationListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_mutation_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
