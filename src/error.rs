//! Error types for poolman.

use std::time::Duration;

use thiserror::Error;

use crate::pool::PoolState;

/// Main error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Cannot {operation} while the pool is {state}")]
    InvalidState {
        operation: &'static str,
        state: PoolState,
    },

    #[error("Not a logger: {0}")]
    TypeMismatch(String),

    #[error("Logger '{0}' is not registered")]
    NotFound(String),

    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No outstanding tasks: get called more times than put")]
    Underflow,

    #[error("Pool terminated: no worker remains to produce pending results")]
    Terminated,

    #[error("Task {seq} failed in worker: {message}")]
    WorkerFailure { seq: u64, message: String },

    #[error("Ordering buffer is holding {limit} out-of-order results, its configured limit")]
    BufferOverflow { limit: usize },

    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PoolError {
    pub(crate) fn invalid_state(operation: &'static str, state: PoolState) -> Self {
        match state {
            PoolState::Terminated => Self::Terminated,
            _ => Self::InvalidState { operation, state },
        }
    }
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
