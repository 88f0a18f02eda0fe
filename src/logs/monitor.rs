//! Parent-side relay of worker log output.
//!
//! ```text
//!   worker 0 stderr ──► pump ─┐
//!   worker 1 stderr ──► pump ─┼──► log channel ──► monitor ──► Logger sinks
//!   worker N stderr ──► pump ─┘                         └───► parent stderr
//! ```
//!
//! Pumps block on their pipe, never on task traffic. A pump ends when its
//! worker closes stderr, so joining the pumps before the monitor relays every
//! record a worker managed to write.

use std::io::Write;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::logger::Logger;
use super::record::LogRecord;
use crate::error::Result;
use crate::worker::ipc::LineReader;
use crate::worker::spawn::spawn_thread;

/// One line read from a worker's stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum LogLine {
    /// A forwarded log record.
    Record { worker_id: usize, record: LogRecord },
    /// Anything else the worker printed.
    Raw { worker_id: usize, line: String },
}

/// Counters reported when the monitor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Records handed to at least one logger.
    pub delivered: u64,
    /// Records no registered logger accepted.
    pub unmatched: u64,
    /// Raw lines copied to stderr.
    pub raw: u64,
}

/// The log monitor thread plus one pump thread per attached worker.
pub struct LogMonitor {
    tx: Option<Sender<LogLine>>,
    pumps: Vec<JoinHandle<()>>,
    monitor: Option<JoinHandle<MonitorStats>>,
}

impl LogMonitor {
    /// Start the monitor thread for `loggers`.
    pub fn start(loggers: Vec<Logger>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let monitor = spawn_thread("pool-log-monitor".to_string(), move || {
            relay(rx, &loggers)
        })?;
        Ok(Self {
            tx: Some(tx),
            pumps: Vec::new(),
            monitor: Some(monitor),
        })
    }

    /// Start pumping a worker's stderr into the log channel.
    pub fn attach(&mut self, worker_id: usize, stderr: LineReader) -> Result<()> {
        let Some(tx) = self.tx.clone() else {
            return Ok(());
        };
        let pump = spawn_thread(format!("pool-log-pump-{}", worker_id), move || {
            pump(worker_id, stderr, tx)
        })?;
        self.pumps.push(pump);
        Ok(())
    }

    /// Wait for every pump to reach EOF, then stop the monitor.
    ///
    /// Callers must make sure the workers are exiting, otherwise this blocks
    /// until they do.
    pub fn shutdown(&mut self) -> MonitorStats {
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
        self.tx = None;
        match self.monitor.take().map(JoinHandle::join) {
            Some(Ok(stats)) => {
                tracing::debug!(
                    delivered = stats.delivered,
                    unmatched = stats.unmatched,
                    raw = stats.raw,
                    "Log monitor stopped"
                );
                stats
            }
            Some(Err(_)) => {
                tracing::warn!("Log monitor thread panicked");
                MonitorStats::default()
            }
            None => MonitorStats::default(),
        }
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        if self.monitor.is_some() {
            self.shutdown();
        }
    }
}

fn pump(worker_id: usize, mut stderr: LineReader, tx: Sender<LogLine>) {
    loop {
        let line = match stderr.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(worker_id, error = %e, "Worker stderr read failed");
                break;
            }
        };
        let message = match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => LogLine::Record { worker_id, record },
            Err(_) => LogLine::Raw {
                worker_id,
                line: line.to_string(),
            },
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}

fn relay(rx: Receiver<LogLine>, loggers: &[Logger]) -> MonitorStats {
    let mut stats = MonitorStats::default();
    for message in rx.iter() {
        match message {
            LogLine::Record { worker_id, record } => {
                let mut matched = false;
                for logger in loggers.iter().filter(|l| l.accepts(&record)) {
                    logger.handle(&record);
                    matched = true;
                }
                if matched {
                    stats.delivered += 1;
                } else {
                    stats.unmatched += 1;
                    tracing::trace!(worker_id, logger = %record.logger, "Dropping unmatched record");
                }
            }
            LogLine::Raw { line, .. } => {
                stats.raw += 1;
                let _ = writeln!(std::io::stderr().lock(), "{}", line);
            }
        }
    }
    stats
}
