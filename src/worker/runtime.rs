//! Worker subprocess main entry point.
//!
//! This module runs when the host program is invoked with
//! [`WORKER_FLAG`](super::spawn::WORKER_FLAG). It binds the requested target
//! from the host's [`Registry`] and serves tasks from the parent until told
//! to exit.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{WorkRequest, WorkResponse};
use super::registry::{Handler, Registry};
use super::spawn::{WORKER_DAEMON_ENV, WORKER_FLAG};

/// True when this process was started as a pool worker.
pub fn is_worker_invocation() -> bool {
    std::env::args_os()
        .nth(1)
        .is_some_and(|arg| arg == WORKER_FLAG)
}

/// Become a worker if this process was started as one.
///
/// Call this first thing in `main`, before parsing arguments or installing a
/// subscriber. Returns normally only in the parent.
pub fn run_if_worker(registry: &Registry) {
    if is_worker_invocation() {
        run_worker_main(registry);
    }
}

/// Run the worker subprocess main function.
///
/// Never returns: the process exits with status 0 after `exit` or EOF on
/// stdin, and with status 1 if the session could not be set up.
pub fn run_worker_main(registry: &Registry) -> ! {
    // Ignore SIGPIPE - pipe errors surface as io::Error
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    if std::env::var(WORKER_DAEMON_ENV).is_ok_and(|v| v == "1") {
        die_with_parent();
    }

    // Safety: file descriptors 0 and 1 are always valid for stdin/stdout
    let stdin_fd = unsafe { PipeFd::from_raw(0) };
    let stdout_fd = unsafe { PipeFd::from_raw(1) };

    let mut reader = LineReader::new(stdin_fd);
    let mut writer = LineWriter::new(stdout_fd);

    match worker_session(registry, &mut reader, &mut writer) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Worker error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(target_os = "linux")]
fn die_with_parent() {
    if let Err(e) = nix::sys::prctl::set_pdeathsig(nix::sys::signal::Signal::SIGKILL) {
        eprintln!("Worker could not request parent-death signal: {}", e);
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent() {}

/// Handshake, then serve tasks until `exit` or EOF.
fn worker_session(
    registry: &Registry,
    reader: &mut LineReader,
    writer: &mut LineWriter,
) -> io::Result<()> {
    let Some(mut handler) = handshake(registry, reader, writer)? else {
        return Ok(());
    };
    writer.write_message(&WorkResponse::Ready)?;
    serve_tasks(&mut handler, reader, writer)
}

/// Read the `init` request and bind its target.
///
/// Returns `None` if the parent hung up or asked to exit before `init`.
fn handshake(
    registry: &Registry,
    reader: &mut LineReader,
    writer: &mut LineWriter,
) -> io::Result<Option<Handler>> {
    let request = match reader.read_message::<WorkRequest>()? {
        None => return Ok(None),
        Some(Ok(request)) => request,
        Some(Err(line)) => {
            return refuse(writer, format!("Invalid init request: {}", preview(&line)));
        }
    };

    match request {
        WorkRequest::Init {
            target,
            kind,
            static_args,
            loggers,
            forward_level,
        } => {
            crate::logging::init_worker(&loggers, forward_level);
            match registry.bind(&target, kind, static_args) {
                Ok(handler) => {
                    tracing::debug!(target_name = %target, %kind, "Worker bound target");
                    Ok(Some(handler))
                }
                Err(message) => refuse(writer, message),
            }
        }
        WorkRequest::Exit => Ok(None),
        WorkRequest::Task { .. } => refuse(writer, "Task received before init".to_string()),
    }
}

fn refuse(writer: &mut LineWriter, message: String) -> io::Result<Option<Handler>> {
    writer.write_message(&WorkResponse::session_error(message.clone()))?;
    Err(io::Error::new(io::ErrorKind::InvalidData, message))
}

/// Worker main loop.
fn serve_tasks(
    handler: &mut Handler,
    reader: &mut LineReader,
    writer: &mut LineWriter,
) -> io::Result<()> {
    loop {
        let request = match reader.read_message::<WorkRequest>()? {
            // EOF - parent closed the pipe
            None => return Ok(()),
            Some(Ok(request)) => request,
            Some(Err(line)) => {
                let response =
                    WorkResponse::session_error(format!("Invalid request: {}", preview(&line)));
                writer.write_message(&response)?;
                continue;
            }
        };

        match request {
            WorkRequest::Exit => return Ok(()),
            WorkRequest::Task { seq, payload } => {
                let response = run_task(handler, seq, payload);
                writer.write_message(&response)?;
            }
            WorkRequest::Init { .. } => {
                writer.write_message(&WorkResponse::session_error("Worker already initialized"))?;
            }
        }
    }
}

/// Run one task, turning errors and panics into an `error` response.
fn run_task(handler: &mut Handler, seq: u64, payload: Value) -> WorkResponse {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(Ok(value)) => WorkResponse::result(seq, value),
        Ok(Err(message)) => WorkResponse::task_error(seq, message),
        Err(panic) => {
            WorkResponse::task_error(seq, format!("Task panicked: {}", panic_message(&*panic)))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn preview(line: &str) -> String {
    const MAX: usize = 120;
    match line.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}
