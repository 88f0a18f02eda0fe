//! What a pool runs: a registered target and how static arguments reach it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a target consumes its static arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Stateless function; static arguments are merged into every payload.
    Function,
    /// Stateful worker object; constructed once per worker with the static
    /// arguments and reused for every task.
    Process,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function => write!(f, "function"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// A target registered in the worker program's [`Registry`](crate::worker::Registry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: String,
    kind: TargetKind,
}

impl Target {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Function,
        }
    }

    pub fn process(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Process,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Payload sent with one task.
    ///
    /// Function targets with static arguments receive `[item, static...]`,
    /// which deserializes into a tuple on the worker side. Everything else
    /// receives the item unchanged.
    pub fn task_payload(&self, item: Value, static_args: &[Value]) -> Value {
        match self.kind {
            TargetKind::Function if !static_args.is_empty() => {
                let mut merged = Vec::with_capacity(static_args.len() + 1);
                merged.push(item);
                merged.extend(static_args.iter().cloned());
                Value::Array(merged)
            }
            _ => item,
        }
    }

    /// Constructor arguments sent once in the `init` request.
    ///
    /// `null` when there are none, so `()` works as an argument type.
    pub fn init_args(&self, static_args: &[Value]) -> Value {
        match self.kind {
            TargetKind::Process if !static_args.is_empty() => Value::Array(static_args.to_vec()),
            _ => Value::Null,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}
