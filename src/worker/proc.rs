//! Process handle for worker subprocesses.
//!
//! The handle is shared: the worker's dispatcher thread stops it at the end of
//! a graceful shutdown while the pool polls it for liveness and kills it on
//! `terminate()`. Reaping is serialized through a mutex so `waitpid` is never
//! called on a pid after it has been reaped.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{WorkRequest, WorkResponse};
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{PoolError, Result};

/// Poll interval while waiting for a process to exit.
const REAP_POLL: Duration = Duration::from_millis(10);

/// How long a SIGTERM or SIGKILL gets before we stop waiting.
const SIGNAL_GRACE: Duration = Duration::from_millis(500);

/// Handle to a worker subprocess.
#[derive(Debug)]
pub struct Proc {
    pid: Pid,
    /// `Some` once the process has been reaped.
    exit: Mutex<Option<TerminationReason>>,
}

/// The three pipes attached to a worker.
#[derive(Debug)]
pub struct ProcChannels {
    /// Requests and responses.
    pub link: WorkerLink,
    /// Worker stderr: forwarded log records and stray output.
    pub stderr: LineReader,
}

/// Request/response half of a worker's pipes.
#[derive(Debug)]
pub struct WorkerLink {
    writer: LineWriter,
    reader: LineReader,
}

impl Proc {
    /// Wrap a spawned child, taking its stdin, stdout and stderr.
    pub fn from_child(mut child: std::process::Child) -> Result<(Self, ProcChannels)> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Worker("Child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PoolError::Worker("Child stderr not captured".into()))?;

        let proc = Self {
            pid,
            exit: Mutex::new(None),
        };
        let channels = ProcChannels {
            link: WorkerLink {
                writer: LineWriter::new(PipeFd::from(stdin)),
                reader: LineReader::new(PipeFd::from(stdout)),
            },
            stderr: LineReader::new(PipeFd::from(stderr)),
        };
        Ok((proc, channels))
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Non-blocking status check. Reaps the process if it has exited.
    pub fn try_wait(&self) -> TerminationReason {
        let mut exit = match self.exit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(reason) = *exit {
            return reason;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => TerminationReason::StillAlive,
            Ok(status) => {
                let reason = analyze_wait_status(status);
                *exit = Some(reason);
                reason
            }
            Err(e) => {
                tracing::debug!(pid = self.pid.as_raw(), error = %e, "waitpid failed");
                *exit = Some(TerminationReason::Unknown);
                TerminationReason::Unknown
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.try_wait().is_running()
    }

    /// Wait up to `timeout` for the process to exit.
    ///
    /// Returns `None` if it is still running afterwards.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TerminationReason> {
        let start = Instant::now();
        loop {
            let reason = self.try_wait();
            if !reason.is_running() {
                return Some(reason);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            std::thread::sleep(REAP_POLL);
        }
    }

    /// Send SIGTERM.
    pub fn terminate(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    /// Send SIGKILL and reap. Never waits longer than a short grace period.
    pub fn kill(&self) -> Result<TerminationReason> {
        self.signal(Signal::SIGKILL)?;
        self.wait_timeout(SIGNAL_GRACE).ok_or_else(|| {
            PoolError::Worker(format!(
                "Worker {} did not exit after SIGKILL",
                self.pid
            ))
        })
    }

    /// Wait for a voluntary exit, then escalate to SIGTERM and SIGKILL.
    pub fn stop(&self, timeout: Duration) -> Result<TerminationReason> {
        if let Some(reason) = self.wait_timeout(timeout) {
            return Ok(reason);
        }
        tracing::debug!(pid = self.pid.as_raw(), "Worker ignored exit request, sending SIGTERM");
        let _ = self.terminate();
        if let Some(reason) = self.wait_timeout(SIGNAL_GRACE) {
            return Ok(reason);
        }
        self.kill()
    }

    fn signal(&self, sig: Signal) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        signal::kill(self.pid, sig)
            .map_err(|e| PoolError::Worker(format!("Failed to send {:?}: {}", sig, e)))
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = self.wait_timeout(SIGNAL_GRACE);
        }
    }
}

impl WorkerLink {
    #[cfg(test)]
    pub fn new(writer: LineWriter, reader: LineReader) -> Self {
        Self { writer, reader }
    }

    /// Send a request to the worker.
    pub fn send(&mut self, request: &WorkRequest) -> Result<()> {
        self.writer
            .write_message(request)
            .map_err(|e| PoolError::Worker(format!("Failed to send to worker: {}", e)))
    }

    /// Receive the next protocol response.
    ///
    /// Lines that are not protocol messages (a target printing to stdout) are
    /// logged and skipped. Returns `None` when the worker closed its stdout.
    pub fn recv(&mut self) -> Result<Option<WorkResponse>> {
        loop {
            match self.reader.read_message::<WorkResponse>() {
                Ok(Some(Ok(response))) => return Ok(Some(response)),
                Ok(Some(Err(stray))) => {
                    tracing::warn!(line = %stray, "Ignoring non-protocol output on worker stdout");
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    return Err(PoolError::Worker(format!(
                        "Failed to receive from worker: {}",
                        e
                    )));
                }
            }
        }
    }
}
