//! Blocking policy for queue operations.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{PoolError, Result};

/// Longest single blocking step. Blocking operations loop in ticks of this
/// size so shutdown can always take the locks they release in between.
pub(crate) const TICK: Duration = Duration::from_millis(100);

/// How long a `put` or `get` may wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Wait {
    /// Wait as long as it takes.
    #[default]
    Block,
    /// Fail immediately instead of waiting.
    NonBlocking,
    /// Wait at most this long.
    Timeout(Duration),
}

impl Wait {
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Self::Timeout(d) => Some(Instant::now() + d),
            Self::Block | Self::NonBlocking => None,
        }
    }

    /// The error reported when this wait runs out.
    pub(crate) fn expired(self) -> PoolError {
        match self {
            Self::Timeout(d) => PoolError::Timeout(d),
            Self::Block | Self::NonBlocking => PoolError::Timeout(Duration::ZERO),
        }
    }

    /// What remains of this wait at `deadline`, or `None` once it has passed.
    pub(crate) fn remaining(self, deadline: Option<Instant>) -> Option<Wait> {
        match (self, deadline) {
            (Self::Timeout(_), Some(deadline)) => {
                let left = deadline.saturating_duration_since(Instant::now());
                (!left.is_zero()).then_some(Self::Timeout(left))
            }
            _ => Some(self),
        }
    }

    /// The next bounded step of this wait, at most one [`TICK`] long, or
    /// `None` once it has run out.
    pub(crate) fn step(self, deadline: Option<Instant>) -> Option<Wait> {
        match self.remaining(deadline)? {
            Self::Block => Some(Self::Timeout(TICK)),
            Self::Timeout(left) => Some(Self::Timeout(left.min(TICK))),
            Self::NonBlocking => Some(Self::NonBlocking),
        }
    }
}

/// Receive one message under `wait`.
///
/// A disconnected channel means every producer is gone, which the pool
/// reports as [`PoolError::Terminated`].
pub(crate) fn recv_with<T>(rx: &Receiver<T>, wait: Wait) -> Result<T> {
    match wait {
        Wait::Block => rx.recv().map_err(|_| PoolError::Terminated),
        Wait::NonBlocking => rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => PoolError::Timeout(Duration::ZERO),
            TryRecvError::Disconnected => PoolError::Terminated,
        }),
        Wait::Timeout(d) => rx.recv_timeout(d).map_err(|e| match e {
            RecvTimeoutError::Timeout => PoolError::Timeout(d),
            RecvTimeoutError::Disconnected => PoolError::Terminated,
        }),
    }
}
