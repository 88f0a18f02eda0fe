//! Logger handles that receive records forwarded from workers.

use std::sync::{Arc, Mutex};

use super::record::{LogLevel, LogRecord, matches_logger};
use crate::error::{PoolError, Result};

/// Destination for forwarded records.
pub trait LogSink: Send + Sync {
    fn handle(&self, record: &LogRecord);
}

/// Re-emits records through `tracing` in the controlling process.
///
/// The original logger name and worker pid travel as fields because a
/// tracing target must be a compile-time constant.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

macro_rules! forward_event {
    ($level:expr, $record:ident) => {
        tracing::event!(
            target: "poolman::worker",
            $level,
            logger = %$record.logger,
            pid = $record.pid,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn handle(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Error => forward_event!(tracing::Level::ERROR, record),
            LogLevel::Warn => forward_event!(tracing::Level::WARN, record),
            LogLevel::Info => forward_event!(tracing::Level::INFO, record),
            LogLevel::Debug => forward_event!(tracing::Level::DEBUG, record),
            LogLevel::Trace => forward_event!(tracing::Level::TRACE, record),
        }
    }
}

/// Keeps every record it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemorySink {
    fn handle(&self, record: &LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// A named logger registered with a pool.
///
/// Records emitted in a worker under this name, or under any name nested
/// below it, are delivered to the logger's sink.
#[derive(Clone)]
pub struct Logger {
    name: String,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Logger that re-emits through `tracing`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_sink(name, Arc::new(TracingSink))
    }

    pub fn with_sink(name: impl Into<String>, sink: Arc<dyn LogSink>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, sink })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self, record: &LogRecord) -> bool {
        matches_logger(&self.name, &record.logger)
    }

    pub fn handle(&self, record: &LogRecord) {
        self.sink.handle(record);
    }
}

impl AsRef<str> for Logger {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl TryFrom<&str> for Logger {
    type Error = PoolError;

    fn try_from(name: &str) -> Result<Self> {
        Self::new(name)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}

/// A logger name is a non-empty path of identifier-like segments.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .split("::")
            .flat_map(|part| part.split('.'))
            .all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            });

    if valid {
        Ok(())
    } else {
        Err(PoolError::TypeMismatch(format!(
            "'{}' is not a logger name",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(logger: &str, message: &str) -> LogRecord {
        LogRecord {
            logger: logger.to_string(),
            level: LogLevel::Info,
            message: message.to_string(),
            timestamp: Utc::now(),
            pid: 1,
        }
    }

    #[test]
    fn test_valid_names() {
        assert!(Logger::new("app").is_ok());
        assert!(Logger::new("app::db").is_ok());
        assert!(Logger::new("test.submodule").is_ok());
        assert!(Logger::new("my-service_2").is_ok());
    }

    #[test]
    fn test_invalid_names_are_type_mismatch() {
        for name in ["", "has space", "app::", "::app", "a..b", "0.1 "] {
            let err = Logger::new(name).unwrap_err();
            assert!(matches!(err, PoolError::TypeMismatch(_)), "{:?}", name);
        }
    }

    #[test]
    fn test_accepts_descendants() {
        let logger = Logger::new("test").unwrap();
        assert!(logger.accepts(&record("test::submodule", "x")));
        assert!(!logger.accepts(&record("information", "x")));
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::with_sink("app", sink.clone()).unwrap();
        logger.handle(&record("app", "one"));
        logger.handle(&record("app::db", "two"));
        assert_eq!(sink.messages(), vec!["one", "two"]);
    }

    #[test]
    fn test_try_from_and_as_ref() {
        let logger = Logger::try_from("app::db").unwrap();
        assert_eq!(logger.as_ref(), "app::db");
        assert!(Logger::try_from("").is_err());
    }
}
