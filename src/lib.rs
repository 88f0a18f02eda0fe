//! poolman - a managed pool of worker processes.
//!
//! A [`PoolManager`] runs one registered target (a function or a stateful
//! [`PoolProcess`]) in a set of worker processes, feeds it tasks through a
//! bounded queue, and hands results back in submission or completion order.
//! Tracing events emitted in workers under registered logger names are
//! relayed to [`Logger`] sinks in the controlling process.
//!
//! Workers are the host program itself, re-executed with a hidden flag, so
//! the host must call [`run_if_worker`] before doing anything else:
//!
//! ```no_run
//! use poolman::{PoolConfig, PoolManager, Registry, Target, run_if_worker};
//!
//! fn registry() -> Registry {
//!     Registry::new().function("square", |x: i64| Ok::<_, String>(x * x))
//! }
//!
//! fn main() -> poolman::Result<()> {
//!     run_if_worker(&registry());
//!
//!     let pool = PoolManager::new(
//!         Target::function("square"),
//!         PoolConfig::new().with_size(4).with_ordered(true),
//!     )?;
//!     for result in pool.map(1..=8)? {
//!         println!("{}", result.decode::<i64>()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod logs;
pub mod pool;
pub mod target;
pub mod worker;

pub use error::{PoolError, Result};
pub use logs::{LogLevel, LogRecord, LogSink, Logger, MemorySink, TracingSink};
pub use pool::{FeedReport, Outcome, PoolConfig, PoolManager, PoolState, ResultEnvelope, Wait};
pub use target::{Target, TargetKind};
pub use worker::{PoolProcess, Registry, WorkerCommand, run_if_worker};
