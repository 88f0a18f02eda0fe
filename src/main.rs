//! poolman - run built-in targets on a pool of worker processes.

mod cli;
mod demo;

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use cli::{Cli, Commands, RunArgs};
use poolman::logging::{self, LogConfig};
use poolman::{
    LogRecord, LogSink, Logger, Outcome, PoolConfig, PoolManager, Registry, Target, TargetKind,
};

fn main() {
    let registry = demo::registry();
    // Worker processes stop here and never return
    poolman::run_if_worker(&registry);

    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(&registry, args),
        Commands::Targets => cmd_targets(&registry),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            // Print the error chain if there are causes
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::for_verbosity(cli.verbose).with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Some(path) = &cli.log_file {
        config = config.with_file(path.clone());
    }
    logging::init_with_file(config);
}

/// Prints forwarded worker records on stderr regardless of the local filter.
struct StderrSink;

impl LogSink for StderrSink {
    fn handle(&self, record: &LogRecord) {
        let _ = writeln!(
            std::io::stderr().lock(),
            "{} {:>5} {} [worker {}] {}",
            record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.level.to_string(),
            record.logger,
            record.pid,
            record.message
        );
    }
}

/// Run a target over the given items, printing one result per line.
///
/// Returns exit status 1 if any task failed.
fn cmd_run(registry: &Registry, args: &RunArgs) -> Result<i32> {
    let kind = registry.kind_of(&args.target).with_context(|| {
        format!(
            "Unknown target '{}'. Run `poolman targets` to list them.",
            args.target
        )
    })?;
    let target = match kind {
        TargetKind::Function => Target::function(&args.target),
        TargetKind::Process => Target::process(&args.target),
    };

    let mut config = PoolConfig::new()
        .with_env_overrides()
        .with_static_args(args.static_args.clone())
        .with_forward_level(args.forward_level);
    if let Some(workers) = args.workers {
        config = config.with_size(workers);
    }
    if let Some(queue_size) = args.queue_size {
        config = config.with_queue_size(queue_size);
    }
    if args.ordered {
        config = config.with_ordered(true);
    }
    let sink = Arc::new(StderrSink);
    for name in &args.forward_logs {
        config = config.with_logger(Logger::with_sink(name.as_str(), sink.clone())?);
    }

    let mut items = args.items.clone();
    if let Some(path) = &args.input {
        items.extend(read_items(path)?);
    }

    let pool = Arc::new(PoolManager::new(target, config)?);
    {
        let pool = Arc::clone(&pool);
        ctrlc::set_handler(move || {
            eprintln!("\nReceived Ctrl+C, terminating workers...");
            let _ = pool.terminate();
        })
        .context("Error setting Ctrl+C handler")?;
    }

    pool.start()?;
    tracing::info!(
        target_name = %pool.target(),
        workers = pool.worker_count(),
        items = items.len(),
        "Running"
    );

    let results = if args.feed {
        pool.put_async(items)?;
        let report = pool.join_async()?;
        tracing::info!(submitted = report.submitted, skipped = report.skipped, "Feed complete");
        pool.get_all()?
    } else {
        pool.map(items)?
    };
    pool.close()?;

    let mut failed = 0usize;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for result in results {
        match result.outcome {
            Outcome::Success { value } => writeln!(out, "{}", value)?,
            Outcome::Failure { message } => {
                failed += 1;
                eprintln!("error: task {}: {}", result.seq, message);
            }
        }
    }
    out.flush()?;

    Ok(if failed > 0 { 1 } else { 0 })
}

/// Items from a file, one per line. Blank lines are skipped.
fn read_items(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;
    let mut items = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        items.push(cli::parse_item(line).map_err(anyhow::Error::msg)?);
    }
    Ok(items)
}

fn cmd_targets(registry: &Registry) -> Result<i32> {
    for (name, kind) in registry.targets() {
        println!("{:<10} {}", name, kind);
    }
    Ok(0)
}
