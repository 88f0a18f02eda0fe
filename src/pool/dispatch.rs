//! Per-worker dispatcher threads.
//!
//! Each dispatcher owns one worker's request/response pipes. It pulls task
//! envelopes from the shared task channel, runs them on its worker one at a
//! time, and pushes result envelopes to the shared result channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use super::envelope::{ResultEnvelope, TaskEnvelope};
use crate::worker::signals::lost_task_message;
use crate::worker::{Proc, TerminationReason, WorkRequest, WorkResponse, WorkerLink};

/// How long a dead worker gets to be reaped before its exit is reported.
const REAP_GRACE: Duration = Duration::from_millis(500);

/// Everything a dispatcher shares with the pool.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub tasks: Receiver<TaskEnvelope>,
    pub results: Sender<ResultEnvelope>,
    /// Set by `terminate`; nothing is reported after it.
    pub halt: Arc<AtomicBool>,
    /// Running dispatchers.
    pub live: Arc<AtomicUsize>,
    pub stop_timeout: Duration,
}

/// Decrements the live count when a dispatcher ends, even by panic.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Why a dispatcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchEnd {
    /// Task channel closed and drained; the worker was told to exit.
    Drained,
    /// The worker died.
    WorkerLost,
    /// The pool was terminated.
    Halted,
}

/// Dispatcher thread body. The caller has already counted it in `ctx.live`.
pub(crate) fn run_dispatcher(
    worker_id: usize,
    proc: Arc<Proc>,
    mut link: WorkerLink,
    ctx: DispatchContext,
) -> DispatchEnd {
    let _live = LiveGuard(ctx.live.clone());
    let mut completed = 0u64;

    let end = loop {
        if ctx.halt.load(Ordering::SeqCst) {
            break DispatchEnd::Halted;
        }

        let task = match ctx.tasks.recv() {
            Ok(task) => task,
            Err(_) => {
                finish(worker_id, &proc, link, ctx.stop_timeout);
                return DispatchEnd::Drained;
            }
        };

        if ctx.halt.load(Ordering::SeqCst) {
            break DispatchEnd::Halted;
        }

        let seq = task.seq;
        let started = Instant::now();
        let (envelope, lost) = run_task(worker_id, &proc, &mut link, task);

        if ctx.halt.load(Ordering::SeqCst) {
            break DispatchEnd::Halted;
        }

        tracing::trace!(
            worker_id,
            seq,
            success = envelope.is_success(),
            elapsed_ms = started.elapsed().as_millis(),
            "Task finished"
        );
        if ctx.results.send(envelope).is_err() {
            break DispatchEnd::Halted;
        }
        completed += 1;

        if lost {
            break DispatchEnd::WorkerLost;
        }
    };

    tracing::debug!(worker_id, completed, ?end, "Dispatcher stopped");
    end
}

/// Run one task. The flag is true when the worker is gone afterwards.
fn run_task(
    worker_id: usize,
    proc: &Proc,
    link: &mut WorkerLink,
    task: TaskEnvelope,
) -> (ResultEnvelope, bool) {
    let seq = task.seq;

    if let Err(e) = link.send(&WorkRequest::task(seq, task.payload)) {
        tracing::debug!(worker_id, seq, error = %e, "Task could not be delivered");
        return (lost(worker_id, proc, seq), true);
    }

    match link.recv() {
        Ok(Some(WorkResponse::Result { value, .. })) => (ResultEnvelope::success(seq, value), false),
        Ok(Some(WorkResponse::Error { message, .. })) => (ResultEnvelope::failure(seq, message), false),
        Ok(Some(WorkResponse::Ready)) => (
            ResultEnvelope::failure(seq, format!("Worker {} answered ready instead of a result", worker_id)),
            false,
        ),
        Ok(None) => (lost(worker_id, proc, seq), true),
        Err(e) => {
            tracing::debug!(worker_id, seq, error = %e, "Worker pipe failed");
            (lost(worker_id, proc, seq), true)
        }
    }
}

fn lost(worker_id: usize, proc: &Proc, seq: u64) -> ResultEnvelope {
    let reason = proc
        .wait_timeout(REAP_GRACE)
        .unwrap_or(TerminationReason::Unknown);
    let message = lost_task_message(worker_id, seq, reason);
    tracing::warn!(worker_id, seq, reason = %reason, "Worker died with a task in flight");
    ResultEnvelope::failure(seq, message)
}

/// Ask the worker to exit, then make sure it does.
fn finish(worker_id: usize, proc: &Proc, mut link: WorkerLink, timeout: Duration) {
    let _ = link.send(&WorkRequest::Exit);
    drop(link);
    match proc.stop(timeout) {
        Ok(reason) if reason.is_success() => {
            tracing::debug!(worker_id, "Worker exited");
        }
        Ok(reason) => {
            tracing::warn!(worker_id, reason = %reason, "Worker exited abnormally");
        }
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "Failed to stop worker");
        }
    }
}
