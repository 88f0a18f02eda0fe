//! The submission side of the task channel.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use serde_json::Value;

use super::channel::{TICK, Wait};
use super::envelope::TaskEnvelope;
use super::lock;
use super::state::PoolState;
use crate::error::{PoolError, Result};

struct Gate {
    /// `None` once the inlet is closed.
    tx: Option<Sender<TaskEnvelope>>,
    next_seq: u64,
}

/// Sequence numbering, enqueueing and outstanding-task accounting.
///
/// A sequence number is assigned under the gate lock only when the envelope
/// actually enters the channel, so failed submissions never leave gaps.
pub struct TaskInlet {
    gate: Mutex<Gate>,
    capacity: usize,
    /// Tasks submitted whose result has not been handed out yet.
    outstanding: AtomicUsize,
    /// Dispatchers still running; no dispatcher means nothing will ever run.
    live: Arc<AtomicUsize>,
    feeding: AtomicBool,
}

impl TaskInlet {
    pub fn new(tx: Sender<TaskEnvelope>, capacity: usize, live: Arc<AtomicUsize>) -> Self {
        Self {
            gate: Mutex::new(Gate {
                tx: Some(tx),
                next_seq: 0,
            }),
            capacity,
            outstanding: AtomicUsize::new(0),
            live,
            feeding: AtomicBool::new(false),
        }
    }

    /// Enqueue `payload`, returning its sequence number.
    pub fn put(&self, payload: Value, wait: Wait) -> Result<u64> {
        let deadline = wait.deadline();
        let mut payload = payload;

        loop {
            let mut gate = lock(&self.gate);
            let Some(tx) = gate.tx.as_ref() else {
                return Err(PoolError::invalid_state("submit tasks", PoolState::Closing));
            };
            if self.live.load(Ordering::SeqCst) == 0 {
                return Err(PoolError::Terminated);
            }

            let envelope = TaskEnvelope {
                seq: gate.next_seq,
                payload,
            };
            let step = match wait {
                Wait::NonBlocking => match tx.try_send(envelope) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => {
                        return Err(PoolError::QueueFull {
                            capacity: self.capacity,
                        });
                    }
                    Err(TrySendError::Disconnected(_)) => return Err(PoolError::Terminated),
                },
                Wait::Block | Wait::Timeout(_) => {
                    let tick = match deadline {
                        Some(deadline) => {
                            TICK.min(deadline.saturating_duration_since(Instant::now()))
                        }
                        None => TICK,
                    };
                    match tx.send_timeout(envelope, tick) {
                        Ok(()) => Ok(()),
                        Err(SendTimeoutError::Timeout(envelope)) => Err(envelope.payload),
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(PoolError::Terminated);
                        }
                    }
                }
            };

            match step {
                Ok(()) => {
                    let seq = gate.next_seq;
                    gate.next_seq += 1;
                    self.outstanding.fetch_add(1, Ordering::SeqCst);
                    return Ok(seq);
                }
                Err(returned) => {
                    drop(gate);
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(wait.expired());
                    }
                    payload = returned;
                }
            }
        }
    }

    /// Stop accepting tasks. Dispatchers see the channel disconnect once
    /// they have drained it.
    pub fn close(&self) {
        lock(&self.gate).tx = None;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.gate).tx.is_none()
    }

    /// Sequence number the next task will get.
    pub fn next_seq(&self) -> u64 {
        lock(&self.gate).next_seq
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Claim one outstanding result. False if none is outstanding.
    pub fn reserve(&self) -> bool {
        self.outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Give back a claim made by [`reserve`](Self::reserve).
    pub fn restore(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Forget `count` tasks that will never produce a result.
    pub fn forget(&self, count: usize) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(count))
            });
    }

    pub fn reset(&self) {
        self.outstanding.store(0, Ordering::SeqCst);
    }

    /// True while a background feeder is submitting.
    pub fn feeding(&self) -> bool {
        self.feeding.load(Ordering::SeqCst)
    }

    pub(crate) fn set_feeding(&self, feeding: bool) {
        self.feeding.store(feeding, Ordering::SeqCst);
    }
}
