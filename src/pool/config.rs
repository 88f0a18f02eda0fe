//! Pool configuration.

use std::time::Duration;

use serde_json::Value;

use crate::error::{PoolError, Result};
use crate::logs::{LogLevel, Logger};
use crate::worker::WorkerCommand;

/// Grace period for workers to exit at close before SIGTERM.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`PoolManager`](super::PoolManager).
///
/// Use the builder methods to customize.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker processes (default: logical cores).
    pub size: usize,
    /// Static arguments merged into function payloads or passed to process
    /// constructors.
    pub static_args: Vec<Value>,
    /// Task queue capacity (None = twice the pool size).
    pub queue_size: Option<usize>,
    /// Return results in submission order (default: completion order).
    pub ordered: bool,
    /// Loggers registered at construction.
    pub loggers: Vec<Logger>,
    /// Kill workers when the pool is dropped or the parent dies (default: true).
    pub daemon: bool,
    /// Program re-executed as a worker (None = current executable).
    pub worker_command: Option<WorkerCommand>,
    /// Least severe level forwarded from workers (default: TRACE).
    pub forward_level: LogLevel,
    /// Cap on results buffered out of order (None = unbounded).
    pub reorder_limit: Option<usize>,
    /// Time a worker gets to exit at close before it is signalled.
    pub stop_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            static_args: Vec::new(),
            queue_size: None,
            ordered: false,
            loggers: Vec::new(),
            daemon: true,
            worker_command: None,
            forward_level: LogLevel::Trace,
            reorder_limit: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Append one static argument.
    pub fn with_static_arg(mut self, arg: impl Into<Value>) -> Self {
        self.static_args.push(arg.into());
        self
    }

    pub fn with_static_args(mut self, args: Vec<Value>) -> Self {
        self.static_args = args;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub fn with_forward_level(mut self, level: LogLevel) -> Self {
        self.forward_level = level;
        self
    }

    pub fn with_reorder_limit(mut self, limit: usize) -> Self {
        self.reorder_limit = Some(limit);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Task queue capacity actually used.
    pub fn effective_queue_size(&self) -> usize {
        self.queue_size.unwrap_or(self.size * 2).max(1)
    }

    /// Apply environment variable overrides.
    ///
    /// Reads from:
    /// - `POOLMAN_WORKERS` for the pool size
    /// - `POOLMAN_QUEUE_SIZE` for the task queue capacity
    /// - `POOLMAN_ORDERED` (`1`/`true`/`yes` or `0`/`false`/`no`)
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("POOLMAN_WORKERS") {
            match raw.trim().parse() {
                Ok(size) => self.size = size,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid POOLMAN_WORKERS"),
            }
        }

        if let Some(raw) = lookup("POOLMAN_QUEUE_SIZE") {
            match raw.trim().parse() {
                Ok(queue_size) => self.queue_size = Some(queue_size),
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid POOLMAN_QUEUE_SIZE"),
            }
        }

        if let Some(raw) = lookup("POOLMAN_ORDERED") {
            match parse_flag(&raw) {
                Some(ordered) => self.ordered = ordered,
                None => tracing::warn!(value = %raw, "Ignoring invalid POOLMAN_ORDERED"),
            }
        }

        self
    }

    /// Reject configurations a pool cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(PoolError::Config("pool size must be at least 1".into()));
        }
        if self.queue_size == Some(0) {
            return Err(PoolError::Config("queue size must be at least 1".into()));
        }
        if self.reorder_limit == Some(0) {
            return Err(PoolError::Config("reorder limit must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert!(config.size >= 1);
        assert_eq!(config.effective_queue_size(), config.size * 2);
        assert!(!config.ordered);
        assert!(config.daemon);
        assert_eq!(config.forward_level, LogLevel::Trace);
        assert_eq!(config.stop_timeout, DEFAULT_STOP_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new()
            .with_size(3)
            .with_queue_size(1)
            .with_ordered(true)
            .with_static_arg(10)
            .with_static_arg("x")
            .with_daemon(false)
            .with_reorder_limit(8);

        assert_eq!(config.size, 3);
        assert_eq!(config.effective_queue_size(), 1);
        assert!(config.ordered);
        assert_eq!(config.static_args, vec![json!(10), json!("x")]);
        assert!(!config.daemon);
        assert_eq!(config.reorder_limit, Some(8));
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(matches!(
            PoolConfig::new().with_size(0).validate(),
            Err(PoolError::Config(_))
        ));
        assert!(PoolConfig::new().with_queue_size(0).validate().is_err());
        assert!(PoolConfig::new().with_reorder_limit(0).validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("POOLMAN_WORKERS", "6"),
            ("POOLMAN_QUEUE_SIZE", "2"),
            ("POOLMAN_ORDERED", "yes"),
        ]
        .into_iter()
        .collect();

        let config = PoolConfig::new()
            .with_size(1)
            .apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.size, 6);
        assert_eq!(config.effective_queue_size(), 2);
        assert!(config.ordered);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let config = PoolConfig::new()
            .with_size(2)
            .apply_env(|key| match key {
                "POOLMAN_WORKERS" => Some("many".into()),
                "POOLMAN_ORDERED" => Some("perhaps".into()),
                _ => None,
            });
        assert_eq!(config.size, 2);
        assert!(!config.ordered);
    }
}
