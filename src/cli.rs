//! Command-line interface definitions
//!
//! Defines all CLI commands and arguments using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stratum - inspect and build sorted table files
#[derive(Parser, Debug)]
#[command(name = "stratum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print row count and file size
    Stats {
        /// Table file
        path: PathBuf,
    },

    /// Print cells in key order
    Dump {
        /// Table file
        path: PathBuf,

        /// Start at the first key >= this one
        #[arg(long, default_value = "")]
        from: String,

        /// Stop after this many cells
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, short = 'f', value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Look up a single key
    Get {
        /// Table file
        path: PathBuf,

        /// Key to look up
        key: String,
    },

    /// Build a new table from JSON lines
    Load {
        /// Table file to create (must not exist)
        path: PathBuf,

        /// Input with one {"key", "timestamp", "value"} object per line;
        /// a null value is a tombstone
        input: PathBuf,

        /// Skip fsync after writing
        #[arg(long)]
        no_sync: bool,
    },
}

/// Output format for dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// One JSON object per line
    Json,
    /// Hex key=value pairs
    Compact,
}
