//! CLI argument parsing for contextstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Bounded cross-iteration memory for ralph loops", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the store file (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the rendered context exactly as an iteration sees it
    Show,

    /// Append an entry
    Add {
        /// Category (learning, error_fix, pattern, discovery, gotcha, fix)
        #[arg(required = true)]
        category: String,

        /// Entry text (the fix, for error_fix entries)
        #[arg(required = true)]
        text: String,

        /// Error text this entry resolves
        #[arg(short, long)]
        error: Option<String>,

        /// Spec name to associate with the entry
        #[arg(long)]
        spec: Option<String>,

        /// Iteration number to associate with the entry
        #[arg(short, long, default_value = "0")]
        iteration: u32,
    },

    /// Apply the configured per-category limits
    Prune,

    /// Show per-category entry counts
    Stats,
}
