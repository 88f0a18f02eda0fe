//! Log records relayed from workers to the parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Severity of a forwarded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO => Self::Info,
            Level::DEBUG => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "Unknown log level: '{}'. Valid options: error, warn, info, debug, trace",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Level::from(*self))
    }
}

/// One log event emitted inside a worker under a registered logger name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Logger name (the tracing target in the worker).
    pub logger: String,
    pub level: LogLevel,
    /// Event message followed by its other fields as `key=value`.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Worker process id.
    pub pid: u32,
}

/// True when `target` is the logger `name` or one of its descendants.
///
/// Both `::` (Rust module paths) and `.` separate levels, so `app` covers
/// `app::db` and `app.db` but not `application`.
pub fn matches_logger(name: &str, target: &str) -> bool {
    match target.strip_prefix(name) {
        Some("") => true,
        Some(rest) => rest.starts_with("::") || rest.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_logger_hierarchy() {
        assert!(matches_logger("test", "test"));
        assert!(matches_logger("test", "test::submodule"));
        assert!(matches_logger("test", "test.submodule"));
        assert!(matches_logger("test::submodule", "test::submodule::deep"));
        assert!(!matches_logger("test", "testing"));
        assert!(!matches_logger("test::submodule", "test"));
        assert!(!matches_logger("information", "test::submodule"));
    }

    #[test]
    fn test_level_conversions() {
        assert_eq!(LogLevel::from(Level::WARN), LogLevel::Warn);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }

    #[test]
    fn test_level_order_matches_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_record_json_shape() {
        let record = LogRecord {
            logger: "app::db".into(),
            level: LogLevel::Info,
            message: "connected".into(),
            timestamp: Utc::now(),
            pid: 42,
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains(r#""level":"INFO""#));
        let parsed: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }
}
