//! Worker processes: spawning, wire protocol and the worker-side runtime.
//!
//! Workers are the host program re-executed with `--internal-worker`. Each
//! one binds a single registered target and serves tasks over its stdin and
//! stdout; its stderr carries forwarded log records.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │  Parent Process │
//!                     │  (PoolManager)  │
//!                     └────────┬────────┘
//!                              │ one dispatcher thread per worker
//!               ┌──────────────┼──────────────┐
//!               │              │              │
//!         ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!         │ Worker 0  │  │ Worker 1  │  │ Worker N  │
//!         │ (process) │  │ (process) │  │ (process) │
//!         │  target   │  │  target   │  │  target   │
//!         └───────────┘  └───────────┘  └───────────┘
//!    stdin: init/task/exit   stdout: ready/result/error   stderr: log records
//! ```
//!
//! # Host program
//!
//! ```no_run
//! use poolman::worker::{Registry, run_if_worker};
//!
//! fn registry() -> Registry {
//!     Registry::new().function("square", |x: i64| Ok::<_, String>(x * x))
//! }
//!
//! fn main() {
//!     run_if_worker(&registry());
//!     // parent program continues here
//! }
//! ```

pub mod ipc;
pub mod proc;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod signals;
pub mod spawn;

pub use proc::{Proc, ProcChannels, WorkerLink};
pub use protocol::{WorkRequest, WorkResponse};
pub use registry::{Handler, PoolProcess, Registry};
pub use runtime::{is_worker_invocation, run_if_worker, run_worker_main};
pub use signals::TerminationReason;
pub use spawn::{WORKER_FLAG, WorkerCommand, spawn_worker};
