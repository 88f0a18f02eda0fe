//! Log forwarding from worker processes to the controlling process.
//!
//! Workers capture tracing events whose target falls under a registered
//! logger name ([`ForwardLayer`]) and write them to stderr as JSON
//! [`LogRecord`] lines. The parent pumps each worker's stderr into a single
//! [`LogMonitor`] thread, which hands records to the matching [`Logger`]
//! sinks.

mod capture;
mod logger;
mod monitor;
mod record;

pub use capture::{ForwardLayer, is_captured};
pub use logger::{LogSink, Logger, MemorySink, TracingSink};
pub use monitor::{LogLine, LogMonitor, MonitorStats};
pub use record::{LogLevel, LogRecord, matches_logger};
