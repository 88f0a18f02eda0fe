//! Unified logging infrastructure for poolman.
//!
//! Provides consistent logging configuration for the CLI, for programs that
//! embed a pool, and for worker processes.
//!
//! # Environment Variables
//!
//! - `POOLMAN_LOG` - Log filter (overrides RUST_LOG)
//! - `POOLMAN_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `POOLMAN_LOG_FORMAT` - Output format: pretty, compact, json
//! - `POOLMAN_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use poolman::logging::{LogConfig, init};
//!
//! // Initialize with default settings
//! init(LogConfig::default());
//!
//! // Or with custom configuration
//! let config = LogConfig::for_verbosity(1).with_env_overrides();
//! init(config);
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::{FilterExt, filter_fn},
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::logs::{ForwardLayer, LogLevel, is_captured};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format (default for development)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Log rotation configuration for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    /// Rotate daily (default)
    #[default]
    Daily,
    /// Never rotate (single file)
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            _ => Err(format!(
                "Unknown log rotation: '{}'. Valid options: hourly, daily, never",
                s
            )),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`] or [`init_with_file`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: INFO)
    pub level: Level,
    /// Log format (default: Pretty)
    pub format: LogFormat,
    /// Path to log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    /// Log rotation for file output (default: Daily)
    pub rotation: LogRotation,
    /// Log span timing on close
    pub span_events: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show target module in logs (default: true)
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_line_numbers: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: LogRotation::Daily,
            span_events: false,
            filter: None,
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for the CLI: warnings by default, `-v` for info, `-vv` for
    /// debug, `-vvv` and more for trace.
    pub fn for_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let config = Self::default().with_level(level);
        if verbose > 0 {
            // An explicit -v beats POOLMAN_LOG / RUST_LOG
            let filter = level.to_string().to_lowercase();
            config.with_filter(filter)
        } else {
            config
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Enable span timing events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Set a custom filter string.
    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Reads from:
    /// - `POOLMAN_LOG` or `RUST_LOG` for filter (only if filter not already set from CLI)
    /// - `POOLMAN_LOG_FORMAT` for format
    /// - `POOLMAN_LOG_FILE` for file path
    /// - `POOLMAN_LOG_LEVEL` for level (only if filter not already set)
    ///
    /// CLI arguments take precedence: if a filter is already set, the filter
    /// variables are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = lookup("POOLMAN_LOG").or_else(|| lookup("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level_str) = lookup("POOLMAN_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        if let Some(format) = lookup("POOLMAN_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        if let Some(path) = lookup("POOLMAN_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Build the EnvFilter for this configuration.
    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                fallback()
            }),
            None => fallback(),
        }
    }
}

/// Parse a log level string.
fn parse_level(s: &str) -> Option<Level> {
    s.parse::<LogLevel>().ok().map(Level::from)
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// One formatting layer for `config`, writing to `writer`.
fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if config.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_span_events(span_events)
        .with_target(config.show_target)
        .with_ansi(ansi)
        .with_writer(writer);

    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer
            .compact()
            .with_thread_ids(config.show_thread_ids)
            .with_line_number(config.show_line_numbers)
            .boxed(),
        LogFormat::Pretty => layer
            .with_thread_ids(config.show_thread_ids)
            .with_line_number(config.show_line_numbers)
            .boxed(),
    }
}

fn install(config: &LogConfig, with_file: bool) {
    let filter = config.build_filter();
    let mut layers = vec![fmt_layer(config, std::io::stderr, true)];

    if with_file && let Some(path) = &config.file_path {
        let parent = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("poolman.log");
        let appender = RollingFileAppender::new(config.rotation.into(), parent, file_name);
        layers.push(fmt_layer(config, appender, false));
    }

    // Silently ignore if already initialized (idempotent)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();
}

/// Initialize the global tracing subscriber, logging to stderr.
///
/// This should be called once at program startup. Subsequent calls are silently ignored.
///
/// For file logging, use [`init_with_file`] instead.
pub fn init(config: LogConfig) {
    install(&config, false);
}

/// Initialize logging to stderr and, when `config.file_path` is set, to a
/// rolling log file.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use poolman::logging::{LogConfig, init_with_file};
///
/// let config = LogConfig::default().with_file(PathBuf::from("/var/log/poolman.log"));
/// init_with_file(config);
/// ```
pub fn init_with_file(config: LogConfig) {
    install(&config, true);
}

/// Initialize logging inside a worker process.
///
/// Events under `loggers` at `forward_level` or more severe are forwarded to
/// the parent as records. Everything else is formatted locally on stderr,
/// which the parent copies to its own stderr. The local filter defaults to
/// WARN and honours `POOLMAN_LOG` and `RUST_LOG`.
pub fn init_worker(loggers: &[String], forward_level: LogLevel) {
    let config = LogConfig::default()
        .with_level(Level::WARN)
        .with_env_overrides();
    let captured = loggers.to_vec();

    let local = fmt::layer()
        .compact()
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(
            config
                .build_filter()
                .and(filter_fn(move |meta| !is_captured(&captured, meta.target()))),
        );

    let forward = ForwardLayer::new(loggers.to_vec(), forward_level, std::io::stderr());

    let _ = tracing_subscriber::registry()
        .with(forward)
        .with(local)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("full".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_rotation_from_str() {
        assert_eq!(
            "hourly".parse::<LogRotation>().unwrap(),
            LogRotation::Hourly
        );
        assert_eq!("never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("invalid"), None);
    }

    #[test]
    fn test_verbosity_presets() {
        let quiet = LogConfig::for_verbosity(0);
        assert_eq!(quiet.level, Level::WARN);
        assert!(quiet.filter.is_none());

        let debug = LogConfig::for_verbosity(2);
        assert_eq!(debug.level, Level::DEBUG);
        assert_eq!(debug.filter.as_deref(), Some("debug"));
        assert_eq!(LogConfig::for_verbosity(9).level, Level::TRACE);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RUST_LOG", "poolman=debug"),
            ("POOLMAN_LOG_FORMAT", "json"),
            ("POOLMAN_LOG_FILE", "/tmp/poolman.log"),
        ]
        .into_iter()
        .collect();

        let config = LogConfig::new().apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.filter.as_deref(), Some("poolman=debug"));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/poolman.log")));
    }

    #[test]
    fn test_cli_filter_beats_env() {
        let config = LogConfig::for_verbosity(1).apply_env(|key| match key {
            "POOLMAN_LOG" => Some("trace".into()),
            "POOLMAN_LOG_LEVEL" => Some("error".into()),
            _ => None,
        });
        assert_eq!(config.filter.as_deref(), Some("info"));
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_level_env_applies_without_filter() {
        let config = LogConfig::new().apply_env(|key| match key {
            "POOLMAN_LOG_LEVEL" => Some("debug".into()),
            _ => None,
        });
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_rotation(LogRotation::Never)
            .with_file(PathBuf::from("/tmp/test.log"));

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.rotation, LogRotation::Never);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/test.log")));
    }
}
