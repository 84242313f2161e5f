use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Offline-first travel journal from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Sync against an in-process backend instead of Supabase
    #[arg(long, global = true)]
    pub offline_demo: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage places
    Place {
        #[command(subcommand)]
        command: PlaceCommands,
    },
    /// Manage visit logs
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Manage trips
    Trip {
        #[command(subcommand)]
        command: TripCommands,
    },
    /// Upload photos and attach them to a log or trip
    Photos {
        /// Owning record kind
        #[arg(value_enum)]
        owner: PhotoOwnerKind,
        /// Record ID or unique ID prefix
        id: String,
        /// Image files to attach
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Run one sync cycle now
    Sync,
    /// Show pending and failed changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue records whose push was rejected
    Retry,
    /// Run the background sync loop until interrupted
    Watch {
        /// Override the sync interval, in seconds
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
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

#[derive(Subcommand)]
pub enum PlaceCommands {
    /// Create a place
    Add {
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List places
    List(ListArgs),
    /// Delete a place
    Delete {
        /// Place ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Create a log for a place
    Add {
        /// Place ID or unique ID prefix
        place: String,
        title: String,
        #[arg(long)]
        notes: Option<String>,
        /// Rating from 1 to 5
        #[arg(long)]
        rating: Option<u8>,
    },
    /// List logs
    List(ListArgs),
    /// Delete a log
    Delete {
        /// Log ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TripCommands {
    /// Create a trip
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Log IDs or unique ID prefixes to group
        #[arg(long = "log", value_name = "ID")]
        logs: Vec<String>,
    },
    /// List trips
    List(ListArgs),
    /// Delete a trip
    Delete {
        /// Trip ID or unique ID prefix
        id: String,
    },
}

#[derive(Args)]
pub struct ListArgs {
    /// Number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PhotoOwnerKind {
    Log,
    Trip,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
