//! The process pool: supervisor, task/result channels and ordering.
//!
//! ```text
//!  put / put_async ──► TaskInlet ──► task channel (bounded) ──► dispatcher ×N ──► worker ×N
//!                                                                    │
//!  get / map ◄── Reorder (ordered pools) ◄── result channel (unbounded) ◄┘
//! ```

mod channel;
mod config;
mod dispatch;
mod envelope;
mod feeder;
mod inlet;
mod liveness;
mod manager;
mod reorder;
mod state;

use std::sync::{Mutex, MutexGuard};

pub use channel::Wait;
pub use config::{DEFAULT_STOP_TIMEOUT, PoolConfig};
pub use envelope::{Outcome, ResultEnvelope, TaskEnvelope};
pub use feeder::FeedReport;
pub use liveness::LIVENESS_WINDOW;
pub use manager::PoolManager;
pub use reorder::Reorder;
pub use state::PoolState;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
