//! Pool lifecycle states.

/// Lifecycle state of a [`PoolManager`](super::PoolManager).
///
/// ```text
/// Idle ──start──► Running ──join──► Closing ──close──► Closed
///   │                │                 │
///   └────────────────┴──── terminate ──┴──────────────► Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Configured, no workers yet. Loggers can be changed.
    Idle,
    /// Workers are up and accepting tasks.
    Running,
    /// No more tasks accepted; queued work drains and results stay readable.
    Closing,
    /// Gracefully shut down.
    Closed,
    /// Forcefully shut down.
    Terminated,
}

impl PoolState {
    pub fn accepts_tasks(self) -> bool {
        self == Self::Running
    }

    /// Results can still be read in `Closing`, after `join`.
    pub fn yields_results(self) -> bool {
        matches!(self, Self::Running | Self::Closing)
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}
