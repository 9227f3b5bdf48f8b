//! Tally CLI - operator tooling for the offline mutation queue
//!
//! Lists what is waiting to sync and replays it against the backend.

mod cli;
mod commands;
mod error;
mod settings;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::dead_letters::run_dead_letters;
use crate::commands::enqueue::run_enqueue;
use crate::commands::list::run_list;
use crate::commands::requeue::run_requeue;
use crate::commands::reset::run_reset;
use crate::commands::sync::run_sync;
use crate::error::CliError;
use crate::settings::{load_settings, resolve_data_dir, resolve_settings_path};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "tally=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let data_dir = resolve_data_dir(cli.data_dir)?;
    let settings_path = resolve_settings_path(cli.config);
    let settings = load_settings(settings_path.as_deref())?;

    match cli.command {
        Commands::Enqueue {
            table,
            record_id,
            operation,
            data,
            priority,
        } => run_enqueue(
            &table,
            &record_id,
            operation.into(),
            data.as_deref(),
            priority,
            &data_dir,
            &settings,
        )?,
        Commands::List { json } => run_list(json, &data_dir, &settings)?,
        Commands::Sync { force } => run_sync(force, &data_dir, &settings).await?,
        Commands::DeadLetters { json } => run_dead_letters(json, &data_dir, &settings)?,
        Commands::Requeue { id } => run_requeue(&id, &data_dir, &settings)?,
        Commands::Reset { unreadable_only } => run_reset(unreadable_only, &data_dir, &settings)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
