//! Worker subprocess spawning.
//!
//! Workers are the host program re-executed with [`WORKER_FLAG`] as its first
//! argument. `std::process::Command` uses `posix_spawn` where it can, which
//! avoids forking a multi-threaded parent.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

use super::proc::{Proc, ProcChannels};
use crate::error::{PoolError, Result};

/// First argument that switches the host program into worker mode.
pub const WORKER_FLAG: &str = "--internal-worker";

/// Environment variable carrying the worker's index in the pool.
pub const WORKER_ID_ENV: &str = "POOLMAN_WORKER_ID";

/// Environment variable set to `1` when the worker must die with its parent.
pub const WORKER_DAEMON_ENV: &str = "POOLMAN_WORKER_DAEMON";

/// The program that is re-executed to become a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable path.
    pub program: PathBuf,
    /// Extra arguments placed after [`WORKER_FLAG`].
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The currently running executable.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            PoolError::Worker(format!("Failed to get current executable: {}", e))
        })?;
        Ok(Self::new(exe))
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Spawn worker `id`.
pub fn spawn_worker(command: &WorkerCommand, id: usize, daemon: bool) -> Result<(Proc, ProcChannels)> {
    let mut cmd = Command::new(&command.program);
    cmd.arg(WORKER_FLAG);
    cmd.args(&command.args);

    // stdin/stdout carry the protocol, stderr the forwarded logs
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    cmd.env(WORKER_ID_ENV, id.to_string());
    cmd.env(WORKER_DAEMON_ENV, if daemon { "1" } else { "0" });

    let child = cmd.spawn().map_err(|e| {
        PoolError::Worker(format!(
            "Failed to spawn worker {} ({}): {}",
            id,
            command.program.display(),
            e
        ))
    })?;

    tracing::debug!(worker_id = id, pid = child.id(), "Spawned worker");
    Proc::from_child(child)
}

/// Spawn a named pool thread.
pub fn spawn_thread<F, T>(name: String, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| PoolError::Worker(format!("Failed to spawn thread {}: {}", name, e)))
}
