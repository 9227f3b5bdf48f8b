use std::path::Path;

use tally_core::SyncSettings;

use crate::commands::common::open_queue;
use crate::error::CliError;

pub fn run_reset(
    unreadable_only: bool,
    data_dir: &Path,
    settings: &SyncSettings,
) -> Result<(), CliError> {
    let queue = open_queue(data_dir, settings)?;

    if unreadable_only {
        if queue.reset_unreadable()? {
            println!("Unreadable queue moved aside and reset");
        } else {
            println!("Queue is readable; nothing to reset");
        }
        return Ok(());
    }

    // Keep a backup of unparseable contents before dropping them.
    if queue.reset_unreadable()? {
        println!("Unreadable queue moved aside");
    }
    let dropped = queue.len()?;
    queue.clear()?;
    println!("Cleared {dropped} pending mutation(s)");
    Ok(())
}
