//! Task and result envelopes carried by the pool's channels.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PoolError, Result};

/// A queued task: its sequence number and the payload sent to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEnvelope {
    pub seq: u64,
    pub payload: Value,
}

/// Result of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { value: Value },
    Failure { message: String },
}

/// A task result tagged with the sequence number of its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResultEnvelope {
    pub fn success(seq: u64, value: Value) -> Self {
        Self {
            seq,
            outcome: Outcome::Success { value },
        }
    }

    pub fn failure(seq: u64, message: impl Into<String>) -> Self {
        Self {
            seq,
            outcome: Outcome::Failure {
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// The value, or `None` for a failed task.
    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { value } => Some(value),
            Outcome::Failure { .. } => None,
        }
    }

    /// Failure message, if the task failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message } => Some(message),
        }
    }

    /// The raw value, with a failed task turned into [`PoolError::WorkerFailure`].
    pub fn into_value(self) -> Result<Value> {
        match self.outcome {
            Outcome::Success { value } => Ok(value),
            Outcome::Failure { message } => Err(PoolError::WorkerFailure {
                seq: self.seq,
                message,
            }),
        }
    }

    /// Decode the value into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_value()?)?)
    }
}
