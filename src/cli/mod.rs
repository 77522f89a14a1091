//! Command line interface for selcache.

pub mod commands;
pub mod workload;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::config::CONFIG_FILE;

/// selcache - memoized selectors with bounded caches and TTL expiry.
#[derive(Parser, Debug)]
#[command(name = "selcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Verbose output (debug logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Writes a default configuration file.
    Init {
        /// Target directory (default: current directory).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Prints the effective configuration.
    Config,

    /// Validates the configuration and lists selector profiles.
    Doctor,

    /// Replays a recorded workload through a selector.
    Replay {
        /// Workload JSON file.
        workload: PathBuf,

        /// Selector profile (overrides the workload's own).
        #[arg(short, long)]
        selector: Option<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Shows version.
    Version,
}
