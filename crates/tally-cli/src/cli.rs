use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tally_core::MutationOperation;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Inspect and replay Tally's offline mutation queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local queue files
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Path to a JSON settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a mutation for the next sync
    #[command(alias = "add")]
    Enqueue {
        /// Remote table name
        table: String,
        /// Record id within the table
        record_id: String,
        /// Operation to replay
        #[arg(value_enum)]
        operation: OperationArg,
        /// JSON payload (ignored for deletes)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
        /// Lower values sync first
        #[arg(short, long, default_value_t = tally_core::models::DEFAULT_PRIORITY)]
        priority: i32,
    },
    /// List pending mutations in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay the queue against the backend
    Sync {
        /// Start a pass even if another one is running
        #[arg(long)]
        force: bool,
    },
    /// List mutations that exhausted their retries
    DeadLetters {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a dead-lettered mutation back into the queue
    Requeue {
        /// Mutation ID
        id: String,
    },
    /// Clear the local queue
    Reset {
        /// Only reset when the stored queue cannot be parsed
        #[arg(long)]
        unreadable_only: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for MutationOperation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Create => Self::Create,
            OperationArg::Update => Self::Update,
            OperationArg::Delete => Self::Delete,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
