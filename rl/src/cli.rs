//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::r#loop::QualityGate;

/// ralphloop - drive a coding agent through a spec, one task per iteration
#[derive(Parser)]
#[command(
    name = "rl",
    about = "Bounded, resumable Ralph Wiggum loops over spec documents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Project root holding the specs directory and context store
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the specs directory and an empty context store
    Init,

    /// Run the loop on a spec until complete, blocked or out of iterations
    Run {
        /// Spec name, directory or file
        spec: String,

        /// Maximum iterations (overrides config and MAX_ITERATIONS)
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Quality gate as `category=command` or a bare command; repeatable, replaces configured gates
        #[arg(long = "gate", value_name = "CMD")]
        gates: Vec<QualityGate>,

        /// Output format for the run summary
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one status record per spec
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the task tree, counts and continuation marker of a spec
    Tasks {
        /// Spec name, directory or file
        spec: String,
    },
}

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ralphloop")
        .join("logs")
        .join("ralphloop.log")
}
