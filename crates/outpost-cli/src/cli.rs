use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use outpost_core::models::Resolution;

#[derive(Parser)]
#[command(name = "outpost")]
#[command(about = "Inspect and repair an Outpost sync store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the record database (defaults to OUTPOST_DATABASE_PATH or ./outpost.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the server version of one record
    Show {
        /// Owning user id
        owner: String,
        /// Table name
        table: String,
        /// Record id
        record: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records changed after a cursor
    Pull {
        /// Owning user id
        owner: String,
        /// Cursor: only changes with a later updatedAt are listed
        #[arg(long, default_value_t = 0)]
        since: i64,
        /// Table to include (repeatable)
        #[arg(long = "table", short = 't', value_name = "TABLE")]
        tables: Vec<String>,
        /// Record a checkpoint hint for this device
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a reported conflict
    Resolve {
        /// Owning user id
        owner: String,
        /// Table name
        table: String,
        /// Record id
        record: String,
        /// Which side wins
        #[arg(long, value_enum)]
        keep: KeepSide,
        /// Client change as JSON, read from a file or `-` for stdin
        #[arg(long, value_name = "FILE")]
        change: Option<PathBuf>,
        /// Server clock the conflict was reported against, e.g. '{"X":1}'
        #[arg(long, value_name = "JSON")]
        expected_clock: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List device checkpoint hints of an owner
    Metadata {
        /// Owning user id
        owner: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Client,
    Server,
}

impl From<KeepSide> for Resolution {
    fn from(side: KeepSide) -> Self {
        match side {
            KeepSide::Client => Self::KeepClient,
            KeepSide::Server => Self::KeepServer,
        }
    }
}
