//! Pool supervisor.
//!
//! Owns the worker processes and the threads around them, enforces the
//! lifecycle state machine and exposes the submission and retrieval API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded, unbounded};
use serde::Serialize;
use tracing::instrument;

use super::channel::{Wait, recv_with};
use super::config::PoolConfig;
use super::dispatch::{DispatchContext, DispatchEnd, run_dispatcher};
use super::envelope::{ResultEnvelope, TaskEnvelope};
use super::feeder::{FeedReport, Feeder};
use super::inlet::TaskInlet;
use super::liveness::LivenessCache;
use super::lock;
use super::reorder::Reorder;
use super::state::PoolState;
use crate::error::{PoolError, Result};
use crate::logs::{LogMonitor, Logger};
use crate::target::Target;
use crate::worker::signals::TerminationReason;
use crate::worker::spawn::spawn_thread;
use crate::worker::{Proc, WorkRequest, WorkResponse, WorkerCommand, WorkerLink, spawn_worker};

/// Poll interval for a `get` waiting on the feeder to submit something.
const FEED_POLL: Duration = Duration::from_millis(5);

/// How long a worker that hung up during startup gets to be reaped.
const STARTUP_REAP: Duration = Duration::from_millis(500);

/// A worker in the active set.
struct WorkerSlot {
    id: usize,
    proc: Arc<Proc>,
}

#[derive(Default)]
struct FeedSlot {
    running: Option<Feeder>,
    /// Report of the last feeder that was joined.
    report: Option<FeedReport>,
}

/// Everything that exists only once the pool has started.
struct Runtime {
    inlet: Arc<TaskInlet>,
    /// Consumer side kept for `clear_tasks` and `terminate`.
    tasks: Receiver<TaskEnvelope>,
    results: Receiver<ResultEnvelope>,
    halt: Arc<AtomicBool>,
    workers: Mutex<Vec<WorkerSlot>>,
    dispatchers: Mutex<Vec<JoinHandle<DispatchEnd>>>,
    monitor: Mutex<LogMonitor>,
    feed: Mutex<FeedSlot>,
    /// Present for ordered pools.
    reorder: Option<Mutex<Reorder>>,
}

impl Runtime {
    fn join_feeder(&self) -> Result<Option<FeedReport>> {
        let running = lock(&self.feed).running.take();
        match running {
            Some(feeder) => {
                let report = feeder.join()?;
                lock(&self.feed).report = Some(report);
                Ok(Some(report))
            }
            None => Ok(lock(&self.feed).report),
        }
    }

    fn join_dispatchers(&self) {
        let handles: Vec<_> = lock(&self.dispatchers).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Dispatcher thread panicked");
            }
        }
    }

    /// Graceful drain: no new tasks, queued ones run, workers exit.
    fn drain(&self) -> Result<()> {
        let feed = self.join_feeder();
        self.inlet.close();
        self.join_dispatchers();
        lock(&self.monitor).shutdown();
        lock(&self.workers).clear();
        feed.map(|_| ())
    }

    /// Forced stop. Failures are logged, never returned.
    fn force_stop(&self) {
        self.halt.store(true, Ordering::SeqCst);

        for slot in lock(&self.workers).iter() {
            match slot.proc.kill() {
                Ok(reason) => {
                    tracing::debug!(worker_id = slot.id, reason = %reason, "Worker killed");
                }
                Err(e) => {
                    tracing::warn!(worker_id = slot.id, error = %e, "Failed to kill worker");
                }
            }
        }

        self.inlet.close();
        let discarded = self.tasks.try_iter().count();
        if let Err(e) = self.join_feeder() {
            tracing::warn!(error = %e, "Feeder did not stop cleanly");
        }
        self.join_dispatchers();
        lock(&self.monitor).shutdown();
        lock(&self.workers).clear();
        self.inlet.reset();
        if let Some(reorder) = &self.reorder {
            lock(reorder).clear();
        }

        if discarded > 0 {
            tracing::debug!(discarded, "Discarded queued tasks");
        }
    }
}

/// A pool of worker processes running one target.
///
/// # Example
///
/// ```no_run
/// use poolman::pool::{PoolConfig, PoolManager};
/// use poolman::target::Target;
///
/// let pool = PoolManager::new(Target::function("square"), PoolConfig::new().with_size(4))?;
/// let results = pool.map(1..=10)?;
/// let squares: Vec<i64> = results
///     .into_iter()
///     .map(|r| r.decode())
///     .collect::<Result<_, _>>()?;
/// # Ok::<(), poolman::PoolError>(())
/// ```
pub struct PoolManager {
    target: Target,
    config: PoolConfig,
    state: Mutex<PoolState>,
    loggers: Mutex<Vec<Logger>>,
    runtime: OnceLock<Runtime>,
    liveness: LivenessCache,
}

impl PoolManager {
    /// Create an idle pool. Nothing is spawned until [`start`](Self::start).
    pub fn new(target: Target, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut loggers: Vec<Logger> = Vec::with_capacity(config.loggers.len());
        for logger in &config.loggers {
            loggers.retain(|l| l.name() != logger.name());
            loggers.push(logger.clone());
        }

        Ok(Self {
            target,
            config,
            state: Mutex::new(PoolState::Idle),
            loggers: Mutex::new(loggers),
            runtime: OnceLock::new(),
            liveness: LivenessCache::default(),
        })
    }

    // ---- loggers ----

    /// Register a logger. Only allowed before the pool starts.
    ///
    /// A logger with the same name replaces the earlier one.
    pub fn add_logger(&self, logger: Logger) -> Result<()> {
        let state = lock(&self.state);
        if *state != PoolState::Idle {
            return Err(PoolError::invalid_state("add a logger", *state));
        }
        let mut loggers = lock(&self.loggers);
        loggers.retain(|l| l.name() != logger.name());
        loggers.push(logger);
        Ok(())
    }

    /// Unregister a logger by handle or name. Only allowed before the pool starts.
    pub fn remove_logger(&self, logger: impl AsRef<str>) -> Result<Logger> {
        let name = logger.as_ref();
        let state = lock(&self.state);
        if *state != PoolState::Idle {
            return Err(PoolError::invalid_state("remove a logger", *state));
        }
        let mut loggers = lock(&self.loggers);
        match loggers.iter().position(|l| l.name() == name) {
            Some(index) => Ok(loggers.remove(index)),
            None => Err(PoolError::NotFound(name.to_string())),
        }
    }

    // ---- lifecycle ----

    /// Spawn the workers and start dispatching.
    ///
    /// On failure every worker spawned so far is killed and the pool is left
    /// terminated.
    #[instrument(level = "debug", skip(self), fields(target_name = %self.target.name(), workers = self.config.size))]
    pub fn start(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if *state != PoolState::Idle {
            return Err(PoolError::invalid_state("start", *state));
        }

        let started = Instant::now();
        let outcome = self
            .launch()
            .and_then(|runtime| match self.runtime.set(runtime) {
                Ok(()) => Ok(()),
                Err(runtime) => {
                    runtime.force_stop();
                    Err(PoolError::Worker("Pool runtime already initialized".into()))
                }
            });
        self.liveness.invalidate();

        match outcome {
            Ok(()) => {
                *state = PoolState::Running;
                tracing::info!(
                    target_name = %self.target.name(),
                    workers = self.config.size,
                    queue_size = self.config.effective_queue_size(),
                    ordered = self.config.ordered,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Pool started"
                );
                Ok(())
            }
            Err(e) => {
                *state = PoolState::Terminated;
                tracing::error!(error = %e, "Pool failed to start");
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<Runtime> {
        let command = match &self.config.worker_command {
            Some(command) => command.clone(),
            None => WorkerCommand::current_exe()?,
        };
        let loggers = lock(&self.loggers).clone();
        let logger_names: Vec<String> = loggers.iter().map(|l| l.name().to_string()).collect();

        let mut monitor = LogMonitor::start(loggers)?;
        let mut workers = Vec::with_capacity(self.config.size);
        let mut links = Vec::with_capacity(self.config.size);

        if let Err(e) = self.spawn_workers(
            &command,
            logger_names,
            &mut monitor,
            &mut workers,
            &mut links,
        ) {
            for slot in &workers {
                let _ = slot.proc.kill();
            }
            drop(links);
            monitor.shutdown();
            return Err(e);
        }

        let queue_size = self.config.effective_queue_size();
        let (task_tx, task_rx) = bounded(queue_size);
        let (result_tx, result_rx) = unbounded();
        let live = Arc::new(AtomicUsize::new(0));
        let halt = Arc::new(AtomicBool::new(false));

        let procs: Vec<(usize, Arc<Proc>)> =
            workers.iter().map(|w| (w.id, w.proc.clone())).collect();

        let runtime = Runtime {
            inlet: Arc::new(TaskInlet::new(task_tx, queue_size, live.clone())),
            tasks: task_rx.clone(),
            results: result_rx,
            halt: halt.clone(),
            workers: Mutex::new(workers),
            dispatchers: Mutex::new(Vec::with_capacity(self.config.size)),
            monitor: Mutex::new(monitor),
            feed: Mutex::new(FeedSlot::default()),
            reorder: self
                .config
                .ordered
                .then(|| Mutex::new(Reorder::new(self.config.reorder_limit))),
        };

        let ctx = DispatchContext {
            tasks: task_rx,
            results: result_tx,
            halt,
            live: live.clone(),
            stop_timeout: self.config.stop_timeout,
        };

        for ((id, proc), link) in procs.into_iter().zip(links) {
            live.fetch_add(1, Ordering::SeqCst);
            let ctx = ctx.clone();
            match spawn_thread(format!("pool-dispatch-{}", id), move || {
                run_dispatcher(id, proc, link, ctx)
            }) {
                Ok(handle) => lock(&runtime.dispatchers).push(handle),
                Err(e) => {
                    live.fetch_sub(1, Ordering::SeqCst);
                    runtime.force_stop();
                    return Err(e);
                }
            }
        }

        Ok(runtime)
    }

    /// Spawn every worker, then run the init handshake with each.
    fn spawn_workers(
        &self,
        command: &WorkerCommand,
        logger_names: Vec<String>,
        monitor: &mut LogMonitor,
        workers: &mut Vec<WorkerSlot>,
        links: &mut Vec<WorkerLink>,
    ) -> Result<()> {
        for id in 0..self.config.size {
            let (proc, channels) = spawn_worker(command, id, self.config.daemon)?;
            workers.push(WorkerSlot {
                id,
                proc: Arc::new(proc),
            });
            // Pumping stderr from the start keeps a chatty init from filling the pipe
            monitor.attach(id, channels.stderr)?;
            links.push(channels.link);
        }

        let init = WorkRequest::Init {
            target: self.target.name().to_string(),
            kind: self.target.kind(),
            static_args: self.target.init_args(&self.config.static_args),
            loggers: logger_names,
            forward_level: self.config.forward_level,
        };

        for (slot, link) in workers.iter().zip(links.iter_mut()) {
            link.send(&init).map_err(|e| {
                PoolError::Worker(format!("Worker {} did not accept init: {}", slot.id, e))
            })?;
        }
        for (slot, link) in workers.iter().zip(links.iter_mut()) {
            await_ready(slot, link)?;
        }
        Ok(())
    }

    /// Stop accepting tasks and wait until every queued task has run.
    ///
    /// Waits for the feeder first. Afterwards the pool is `Closing`: workers
    /// have exited and the remaining results can still be read with `get`.
    pub fn join(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                PoolState::Running => *state = PoolState::Closing,
                PoolState::Closing => {}
                other => return Err(PoolError::invalid_state("join", other)),
            }
        }
        self.liveness.invalidate();

        let outcome = match self.runtime.get() {
            Some(runtime) => runtime.drain(),
            None => Err(PoolError::Terminated),
        };
        self.liveness.invalidate();
        tracing::debug!(outstanding = self.outstanding(), "Pool joined");
        outcome
    }

    /// Graceful shutdown.
    ///
    /// Queued tasks still run, workers are asked to exit and escalated to
    /// SIGTERM and SIGKILL after the configured stop timeout. Unread results
    /// are discarded. Does nothing on a closed or terminated pool.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                PoolState::Closed | PoolState::Terminated => return Ok(()),
                PoolState::Idle => {
                    *state = PoolState::Closed;
                    return Ok(());
                }
                PoolState::Running | PoolState::Closing => *state = PoolState::Closing,
            }
        }
        self.liveness.invalidate();

        let outcome = match self.runtime.get() {
            Some(runtime) => runtime.drain(),
            None => Ok(()),
        };

        {
            let mut state = lock(&self.state);
            if *state != PoolState::Terminated {
                *state = PoolState::Closed;
            }
        }
        self.liveness.invalidate();
        tracing::info!(target_name = %self.target.name(), "Pool closed");
        outcome
    }

    /// Kill every worker and stop all pool threads. Safe from any state.
    pub fn terminate(&self) -> Result<()> {
        let previous = {
            let mut state = lock(&self.state);
            let previous = *state;
            if previous == PoolState::Terminated {
                return Ok(());
            }
            *state = PoolState::Terminated;
            previous
        };

        if let Some(runtime) = self.runtime.get() {
            runtime.force_stop();
        }
        self.liveness.invalidate();
        tracing::info!(target_name = %self.target.name(), previous = %previous, "Pool terminated");
        Ok(())
    }

    // ---- submission ----

    /// Submit one item, waiting for queue space. Returns its sequence number.
    pub fn put<T: Serialize>(&self, item: T) -> Result<u64> {
        self.put_with(item, Wait::Block)
    }

    /// Submit one item under `wait`.
    ///
    /// Every worker holds one running task outside the queue, so up to
    /// `queue_size + size` tasks are accepted before a non-blocking put
    /// fails with [`PoolError::QueueFull`].
    pub fn put_with<T: Serialize>(&self, item: T, wait: Wait) -> Result<u64> {
        let runtime = self.running("submit tasks")?;
        let value = serde_json::to_value(item)?;
        let payload = self.target.task_payload(value, &self.config.static_args);
        runtime.inlet.put(payload, wait)
    }

    /// Submit a stream of items from a background thread.
    ///
    /// Only one feeder may run at a time. Items that fail to serialize are
    /// skipped and counted in the [`FeedReport`].
    pub fn put_async<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Serialize,
    {
        let runtime = self.running("start a feeder")?;
        let mut feed = lock(&runtime.feed);
        if feed.running.is_some() {
            return Err(PoolError::invalid_state(
                "start a second feeder",
                PoolState::Running,
            ));
        }
        feed.running = Some(Feeder::spawn(
            runtime.inlet.clone(),
            self.target.clone(),
            self.config.static_args.clone(),
            items,
        )?);
        Ok(())
    }

    /// Wait for the feeder started by [`put_async`](Self::put_async).
    pub fn join_async(&self) -> Result<FeedReport> {
        let state = self.state();
        let runtime = self.readable("join the feeder")?;
        runtime
            .join_feeder()?
            .ok_or(PoolError::InvalidState {
                operation: "join the feeder before put_async",
                state,
            })
    }

    // ---- retrieval ----

    /// Next result, blocking until one is available.
    pub fn get(&self) -> Result<ResultEnvelope> {
        self.get_with(Wait::Block)
    }

    /// Next result under `wait`.
    ///
    /// Ordered pools return results in submission order, others in
    /// completion order. A failed call never consumes a result.
    pub fn get_with(&self, wait: Wait) -> Result<ResultEnvelope> {
        let runtime = self.readable("get results")?;
        let deadline = wait.deadline();

        reserve(runtime, wait, deadline)?;
        let result = match &runtime.reorder {
            Some(reorder) => next_ordered(runtime, reorder, wait, deadline),
            None => next_completed(runtime, wait, deadline),
        };
        if result.is_err() {
            runtime.inlet.restore();
        }
        result
    }

    /// Wait for the feeder, then collect every outstanding result.
    pub fn get_all(&self) -> Result<Vec<ResultEnvelope>> {
        let runtime = self.readable("get results")?;
        runtime.join_feeder()?;

        let mut results = Vec::with_capacity(runtime.inlet.outstanding());
        while runtime.inlet.outstanding() > 0 {
            results.push(self.get()?);
        }
        Ok(results)
    }

    /// Run every item and collect exactly that many results.
    ///
    /// An idle pool is started for the call and closed afterwards (terminated
    /// if anything failed).
    pub fn map<I>(&self, items: I) -> Result<Vec<ResultEnvelope>>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let owned = self.state() == PoolState::Idle;
        if owned {
            self.start()?;
        }

        let result = self.map_running(items);

        if owned {
            match &result {
                Ok(_) => self.close()?,
                Err(_) => {
                    let _ = self.terminate();
                }
            }
        }
        result
    }

    fn map_running<I>(&self, items: I) -> Result<Vec<ResultEnvelope>>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut submitted = 0usize;
        for item in items {
            self.put(item)?;
            submitted += 1;
        }
        (0..submitted).map(|_| self.get()).collect()
    }

    /// Discard tasks still waiting in the queue. Returns how many.
    ///
    /// Tasks already handed to a worker still produce results.
    pub fn clear_tasks(&self) -> Result<usize> {
        let runtime = self.readable("clear tasks")?;

        let mut reorder = runtime.reorder.as_ref().map(lock);
        let mut count = 0;
        for task in runtime.tasks.try_iter() {
            if let Some(reorder) = reorder.as_mut() {
                reorder.skip(task.seq);
            }
            count += 1;
        }
        drop(reorder);

        runtime.inlet.forget(count);
        tracing::debug!(count, "Cleared queued tasks");
        Ok(count)
    }

    // ---- introspection ----

    /// True if at least one worker is running.
    ///
    /// Polls every worker and drops dead ones from the active set. The
    /// answer is cached for a few seconds.
    pub fn is_alive(&self) -> bool {
        if let Some(alive) = self.liveness.get() {
            return alive;
        }

        let alive = match self.runtime.get() {
            Some(runtime) if self.state().yields_results() => {
                let mut workers = lock(&runtime.workers);
                workers.retain(|slot| {
                    let running = slot.proc.is_running();
                    if !running {
                        tracing::debug!(
                            worker_id = slot.id,
                            reason = %slot.proc.try_wait(),
                            "Removing dead worker"
                        );
                    }
                    running
                });
                !workers.is_empty()
            }
            _ => false,
        };

        self.liveness.set(alive);
        alive
    }

    pub fn state(&self) -> PoolState {
        *lock(&self.state)
    }

    /// Submitted tasks whose result has not been returned yet.
    pub fn outstanding(&self) -> usize {
        self.runtime
            .get()
            .map_or(0, |runtime| runtime.inlet.outstanding())
    }

    /// Tasks waiting in the queue for a worker.
    pub fn pending_tasks(&self) -> usize {
        self.runtime.get().map_or(0, |runtime| runtime.tasks.len())
    }

    /// Workers in the active set.
    pub fn worker_count(&self) -> usize {
        self.runtime
            .get()
            .map_or(0, |runtime| lock(&runtime.workers).len())
    }

    /// Process ids of the workers in the active set.
    pub fn worker_pids(&self) -> Vec<u32> {
        self.runtime.get().map_or_else(Vec::new, |runtime| {
            lock(&runtime.workers)
                .iter()
                .map(|slot| slot.proc.pid().as_raw() as u32)
                .collect()
        })
    }

    pub fn loggers(&self) -> Vec<Logger> {
        lock(&self.loggers).clone()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn running(&self, operation: &'static str) -> Result<&Runtime> {
        let state = self.state();
        if !state.accepts_tasks() {
            return Err(PoolError::invalid_state(operation, state));
        }
        self.runtime.get().ok_or(PoolError::Terminated)
    }

    fn readable(&self, operation: &'static str) -> Result<&Runtime> {
        let state = self.state();
        if !state.yields_results() {
            return Err(PoolError::invalid_state(operation, state));
        }
        self.runtime.get().ok_or(PoolError::Terminated)
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        if !self.state().yields_results() {
            return;
        }
        let outcome = if self.config.daemon {
            self.terminate()
        } else {
            self.close()
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "Pool shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("target", &self.target)
            .field("state", &self.state())
            .field("size", &self.config.size)
            .field("ordered", &self.config.ordered)
            .finish()
    }
}

fn await_ready(slot: &WorkerSlot, link: &mut WorkerLink) -> Result<()> {
    match link.recv()? {
        Some(WorkResponse::Ready) => Ok(()),
        Some(WorkResponse::Error { message, .. }) => Err(PoolError::Worker(format!(
            "Worker {} failed to start: {}",
            slot.id, message
        ))),
        Some(other) => Err(PoolError::Worker(format!(
            "Worker {} sent unexpected response instead of Ready: {:?}",
            slot.id, other
        ))),
        None => {
            let reason = slot
                .proc
                .wait_timeout(STARTUP_REAP)
                .unwrap_or(TerminationReason::Unknown);
            Err(PoolError::Worker(format!(
                "Worker {} {} before it was ready",
                slot.id, reason
            )))
        }
    }
}

/// Claim one outstanding result, waiting on a running feeder if needed.
fn reserve(runtime: &Runtime, wait: Wait, deadline: Option<Instant>) -> Result<()> {
    loop {
        if runtime.inlet.reserve() {
            return Ok(());
        }
        if !runtime.inlet.feeding() {
            // The feeder may have submitted its last item since the first check
            return if runtime.inlet.reserve() {
                Ok(())
            } else {
                Err(PoolError::Underflow)
            };
        }
        match wait.remaining(deadline) {
            Some(Wait::NonBlocking) | None => return Err(wait.expired()),
            Some(_) => std::thread::sleep(FEED_POLL),
        }
    }
}

fn next_completed(runtime: &Runtime, wait: Wait, deadline: Option<Instant>) -> Result<ResultEnvelope> {
    let Some(left) = wait.remaining(deadline) else {
        return Err(wait.expired());
    };
    recv_with(&runtime.results, left).map_err(|e| restate_timeout(e, wait))
}

/// Release results in sequence order, buffering early arrivals.
///
/// The buffer lock is never held while receiving, and receives run in
/// ticks so a caller blocked on the channel notices when another caller
/// buffered its result. With a full buffer one more envelope is still
/// received, so the due result can always get through; anything else is
/// buffered past the limit and reported as `BufferOverflow`.
fn next_ordered(
    runtime: &Runtime,
    reorder: &Mutex<Reorder>,
    wait: Wait,
    deadline: Option<Instant>,
) -> Result<ResultEnvelope> {
    loop {
        let overflow = {
            let mut buffer = lock(reorder);
            if let Some(envelope) = buffer.take_ready() {
                return Ok(envelope);
            }
            buffer.limit().filter(|_| buffer.is_full())
        };

        let Some(step) = wait.step(deadline) else {
            return Err(wait.expired());
        };
        let envelope = match recv_with(&runtime.results, step) {
            Ok(envelope) => envelope,
            Err(PoolError::Timeout(_)) if wait != Wait::NonBlocking => continue,
            // Another caller may have buffered the due result meanwhile
            Err(PoolError::Terminated) => {
                return lock(reorder).take_ready().ok_or(PoolError::Terminated);
            }
            Err(e) => return Err(restate_timeout(e, wait)),
        };

        let mut buffer = lock(reorder);
        buffer.insert(envelope);
        if let Some(limit) = overflow {
            return buffer
                .take_ready()
                .ok_or(PoolError::BufferOverflow { limit });
        }
    }
}

/// Report the caller's timeout, not the remainder used for the last step.
fn restate_timeout(error: PoolError, wait: Wait) -> PoolError {
    match error {
        PoolError::Timeout(_) => wait.expired(),
        other => other,
    }
}
