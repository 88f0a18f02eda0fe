//! Targets a worker program can run, registered by name.
//!
//! Closures cannot cross a process boundary, so the host program builds the
//! same [`Registry`] in every process and the pool refers to targets by name.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::target::TargetKind;

/// A stateful worker object.
///
/// `init` runs once per worker process with the pool's static arguments;
/// the instance then serves every task that worker receives.
pub trait PoolProcess: Sized + 'static {
    /// Static arguments, decoded from a JSON array (or `null` when there are none).
    type Args: DeserializeOwned;
    type Input: DeserializeOwned;
    type Output: Serialize;
    type Error: Display;

    fn init(args: Self::Args) -> Result<Self, Self::Error>;

    fn run(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// A bound target, ready to run tasks. Errors are diagnostic text.
pub type Handler = Box<dyn FnMut(Value) -> Result<Value, String>>;

type FunctionFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
type ProcessFactory = Box<dyn Fn(Value) -> Result<Handler, String> + Send + Sync>;

enum Entry {
    Function(FunctionFn),
    Process(ProcessFactory),
}

impl Entry {
    fn kind(&self) -> TargetKind {
        match self {
            Self::Function(_) => TargetKind::Function,
            Self::Process(_) => TargetKind::Process,
        }
    }
}

/// Name → target table shared by the parent program and its workers.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function target.
    ///
    /// With static arguments the payload is `[item, static...]`, so `A` is
    /// usually a tuple such as `(i64, i64)`.
    pub fn function<A, R, E, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
        A: DeserializeOwned,
        R: Serialize,
        E: Display,
    {
        let call = move |payload: Value| -> Result<Value, String> {
            let args: A = serde_json::from_value(payload)
                .map_err(|e| format!("Invalid task payload: {}", e))?;
            let output = f(args).map_err(|e| e.to_string())?;
            serde_json::to_value(output).map_err(|e| format!("Unserializable result: {}", e))
        };
        self.entries
            .insert(name.into(), Entry::Function(Arc::new(call)));
        self
    }

    /// Register a stateful worker type.
    pub fn process<P: PoolProcess>(mut self, name: impl Into<String>) -> Self {
        let factory = |args: Value| -> Result<Handler, String> {
            let args: P::Args = serde_json::from_value(args)
                .map_err(|e| format!("Invalid static arguments: {}", e))?;
            let mut instance =
                P::init(args).map_err(|e| format!("Worker initialization failed: {}", e))?;

            Ok(Box::new(move |payload: Value| {
                let input: P::Input = serde_json::from_value(payload)
                    .map_err(|e| format!("Invalid task payload: {}", e))?;
                let output = instance.run(input).map_err(|e| e.to_string())?;
                serde_json::to_value(output)
                    .map_err(|e| format!("Unserializable result: {}", e))
            }))
        };
        self.entries
            .insert(name.into(), Entry::Process(Box::new(factory)));
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<TargetKind> {
        self.entries.get(name).map(Entry::kind)
    }

    /// Registered targets in name order.
    pub fn targets(&self) -> impl Iterator<Item = (&str, TargetKind)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.kind()))
    }

    /// Resolve a target for one worker session.
    pub fn bind(&self, name: &str, kind: TargetKind, static_args: Value) -> Result<Handler, String> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| format!("Unknown target '{}'", name))?;

        if entry.kind() != kind {
            return Err(format!(
                "Target '{}' is registered as a {}, not a {}",
                name,
                entry.kind(),
                kind
            ));
        }

        match entry {
            Entry::Function(f) => {
                let f = Arc::clone(f);
                Ok(Box::new(move |payload| f(payload)))
            }
            Entry::Process(factory) => factory(static_args),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.targets()).finish()
    }
}
