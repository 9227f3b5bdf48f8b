use std::path::Path;

use tally_core::SyncSettings;

use crate::commands::common::{
    format_mutation_lines, mutation_to_list_item, open_queue, MutationListItem,
};
use crate::error::CliError;

pub fn run_dead_letters(
    as_json: bool,
    data_dir: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let parked = open_queue(data_dir, settings)?.dead_letters()?;

    if as_json {
        let json_items = parked
            .iter()
            .map(mutation_to_list_item)
            .collect::<Vec<MutationListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if parked.is_empty() {
        println!("No dead-lettered mutations.");
        return Ok(());
    }

    for line in format_mutation_lines(&parked) {
        println!("{line}");
    }
    Ok(())
}
