//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "edgeos-bouncer")]
#[command(author, version, about = "Sync an EdgeOS address group with a CrowdSec decision feed")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (optional, environment variables override it)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Keep the address group in sync until interrupted
    Run,

    /// Show the address group as currently stored on the device
    Show {
        /// Print every address, not only the count
        #[arg(long)]
        list: bool,
    },

    /// Resynchronize the group with the feed's current state once, then exit
    Sync {
        /// Delete the whole address field and set the full state
        #[arg(long)]
        replace_all: bool,
    },

    /// Show version information
    Version,
}
