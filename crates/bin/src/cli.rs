//! CLI argument definitions for the Ordinal binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database (default)
    Sqlite,
    /// PostgreSQL database (for shared deployments)
    Postgres,
    /// In-memory with JSON persistence (for development)
    Inmemory,
}

/// Ordinal: ordered collections on fractional position keys
#[derive(Parser, Debug)]
#[command(name = "ordinal")]
#[command(about = "Keep items in a user-defined order without renumbering")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format
    #[arg(long, global = true, default_value = "human", env = "ORDINAL_FORMAT")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where positions are stored and how they are allocated.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Storage backend to use
    #[arg(short, long, global = true, default_value = "sqlite", env = "ORDINAL_BACKEND")]
    pub backend: Backend,

    /// Data directory for storage files.
    /// For SQLite: stores ordinal.db
    /// For InMemory: stores ordinal.json
    #[arg(short = 'D', long, global = true, env = "ORDINAL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// PostgreSQL connection URL (required when backend=postgres)
    #[arg(long, global = true, env = "ORDINAL_POSTGRES_URL")]
    pub postgres_url: Option<String>,

    /// JSON file with allocator, rebalance and retry settings
    #[arg(short, long, global = true, env = "ORDINAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Key spacing used by rebalances (overrides the config file)
    #[arg(long, global = true, env = "ORDINAL_SPACING")]
    pub spacing: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List containers with their item counts
    Containers,
    /// Show the items of a container in order
    List {
        container: String,
    },
    /// Add a new item at the bottom (or top) of a container
    Add {
        container: String,
        /// Item id; generated if omitted
        #[arg(long)]
        item: Option<String>,
        /// Add at the top instead of the bottom
        #[arg(long)]
        top: bool,
    },
    /// Place an item immediately before another
    Before(RelativeArgs),
    /// Place an item immediately after another
    After(RelativeArgs),
    /// Move an item to the top of its container
    Top(EdgeArgs),
    /// Move an item to the bottom of its container
    Bottom(EdgeArgs),
    /// Move an item into another container
    Reparent {
        item: String,
        container: String,
        /// Place it at the top instead of the bottom
        #[arg(long)]
        top: bool,
    },
    /// Delete an item
    Remove {
        item: String,
    },
    /// Re-key a container with even spacing
    Rebalance {
        container: String,
    },
}

#[derive(Args, Debug)]
pub struct RelativeArgs {
    pub container: String,
    pub item: String,
    /// The item to place next to
    pub reference: String,
}

#[derive(Args, Debug)]
pub struct EdgeArgs {
    pub container: String,
    pub item: String,
}

impl Commands {
    /// True for commands that change stored positions.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Commands::Containers | Commands::List { .. })
    }
}
