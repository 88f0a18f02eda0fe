//! Wire protocol between the pool and its worker processes.
//!
//! Messages are JSON-serialized and newline-delimited. A session is:
//! `init` → `ready`, then any number of `task` → `result`/`error` pairs,
//! then `exit` (or EOF on the worker's stdin).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logs::LogLevel;
use crate::target::TargetKind;

/// Request from parent to worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkRequest {
    /// First message of every session: which target to bind and how.
    #[serde(rename = "init")]
    Init {
        /// Registered target name
        target: String,
        /// Expected kind, checked against the worker's registry
        kind: TargetKind,
        /// Constructor arguments for process targets (`null` when none)
        static_args: Value,
        /// Logger names whose events are forwarded to the parent
        loggers: Vec<String>,
        /// Least severe level that is forwarded
        forward_level: LogLevel,
    },

    /// Run the target once.
    #[serde(rename = "task")]
    Task { seq: u64, payload: Value },

    /// Graceful shutdown request.
    #[serde(rename = "exit")]
    Exit,
}

/// Response from worker to parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkResponse {
    /// Target bound, worker accepts tasks.
    #[serde(rename = "ready")]
    Ready,

    /// Task completed.
    #[serde(rename = "result")]
    Result { seq: u64, value: Value },

    /// Task failed, or (with no `seq`) the session could not be set up.
    #[serde(rename = "error")]
    Error { seq: Option<u64>, message: String },
}

impl WorkRequest {
    pub fn task(seq: u64, payload: Value) -> Self {
        Self::Task { seq, payload }
    }
}

impl WorkResponse {
    pub fn result(seq: u64, value: Value) -> Self {
        Self::Result { seq, value }
    }

    pub fn task_error(seq: u64, message: impl Into<String>) -> Self {
        Self::Error {
            seq: Some(seq),
            message: message.into(),
        }
    }

    pub fn session_error(message: impl Into<String>) -> Self {
        Self::Error {
            seq: None,
            message: message.into(),
        }
    }
}
