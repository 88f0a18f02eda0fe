//! Worker-side capture of tracing events for registered loggers.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::record::{LogLevel, LogRecord, matches_logger};

/// True when `target` falls under one of `loggers`.
pub fn is_captured(loggers: &[String], target: &str) -> bool {
    loggers.iter().any(|name| matches_logger(name, target))
}

/// Tracing layer that serializes captured events as [`LogRecord`] lines.
///
/// Installed in worker processes with stderr as the writer; the parent's log
/// monitor reads the other end of that pipe.
pub struct ForwardLayer<W> {
    loggers: Vec<String>,
    min_level: LogLevel,
    writer: Mutex<W>,
    pid: u32,
}

impl<W: Write> ForwardLayer<W> {
    pub fn new(loggers: Vec<String>, min_level: LogLevel, writer: W) -> Self {
        Self {
            loggers,
            min_level,
            writer: Mutex::new(writer),
            pid: std::process::id(),
        }
    }

    pub fn captures(&self, target: &str) -> bool {
        is_captured(&self.loggers, target)
    }

    fn emit(&self, record: &LogRecord) {
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        if let Ok(mut writer) = self.writer.lock() {
            // One write per line keeps records intact next to other stderr output
            let _ = writer.write_all(format!("{}\n", line).as_bytes());
            let _ = writer.flush();
        }
    }
}

impl<S, W> Layer<S> for ForwardLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !self.captures(meta.target()) {
            return;
        }
        let level = LogLevel::from(*meta.level());
        if level > self.min_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.emit(&LogRecord {
            logger: meta.target().to_string(),
            level,
            message: visitor.finish(),
            timestamp: Utc::now(),
            pid: self.pid,
        });
    }
}

/// Collects the `message` field plus the remaining fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn records(&self) -> Vec<LogRecord> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture<F: FnOnce()>(loggers: &[&str], min_level: LogLevel, f: F) -> Vec<LogRecord> {
        let buf = SharedBuf::default();
        let layer = ForwardLayer::new(
            loggers.iter().map(|s| s.to_string()).collect(),
            min_level,
            buf.clone(),
        );
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        buf.records()
    }

    #[test]
    fn test_only_registered_loggers_are_captured() {
        let records = capture(&["test"], LogLevel::Trace, || {
            tracing::info!(target: "test::submodule", "from child");
            tracing::info!(target: "information", "not ours");
            tracing::warn!(target: "test", "from root");
        });

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].logger, "test::submodule");
        assert_eq!(records[0].message, "from child");
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[1].pid, std::process::id());
    }

    #[test]
    fn test_min_level_filters() {
        let records = capture(&["app"], LogLevel::Info, || {
            tracing::debug!(target: "app", "too chatty");
            tracing::error!(target: "app", "kept");
        });
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
    }

    #[test]
    fn test_fields_are_appended() {
        let records = capture(&["app"], LogLevel::Trace, || {
            tracing::info!(target: "app", item = 3, name = "x", "processing");
        });
        assert_eq!(records[0].message, "processing item=3 name=x");
    }

    #[test]
    fn test_is_captured() {
        let loggers = vec!["a::b".to_string(), "c".to_string()];
        assert!(is_captured(&loggers, "a::b::c"));
        assert!(is_captured(&loggers, "c"));
        assert!(!is_captured(&loggers, "a"));
        assert!(!is_captured(&[], "a"));
    }
}
