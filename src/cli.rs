//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use poolman::LogLevel;
use poolman::logging::LogFormat;
use serde_json::Value;

/// Run the built-in targets on a pool of worker processes.
#[derive(Parser, Debug)]
#[command(name = "poolman")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format (pretty, compact, json).
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a target over a list of items and print one JSON result per line.
    Run(RunArgs),

    /// List the built-in targets.
    Targets,
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Target to run (see `poolman targets`).
    #[arg(short, long)]
    pub target: String,

    /// Number of worker processes [default: logical cores, or POOLMAN_WORKERS].
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Task queue capacity [default: twice the worker count, or POOLMAN_QUEUE_SIZE].
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// Print results in input order instead of completion order.
    #[arg(long)]
    pub ordered: bool,

    /// Static argument passed to every task (JSON, repeatable).
    #[arg(long = "static-arg", value_name = "JSON", value_parser = parse_item)]
    pub static_args: Vec<Value>,

    /// Read items from a file, one per line.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Forward worker logs under this logger name to stderr (repeatable).
    #[arg(long = "forward-logs", value_name = "NAME")]
    pub forward_logs: Vec<String>,

    /// Least severe worker log level to forward.
    #[arg(long, default_value = "trace")]
    pub forward_level: LogLevel,

    /// Submit items from a background feeder instead of one by one.
    #[arg(long)]
    pub feed: bool,

    /// Items to process. Each is parsed as JSON, falling back to a string.
    #[arg(value_parser = parse_item)]
    pub items: Vec<Value>,
}

/// Parse a JSON value, treating anything that is not JSON as a string.
pub fn parse_item(s: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
}
