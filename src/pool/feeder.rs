//! Background submission of an item stream.

use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use serde_json::Value;

use super::channel::Wait;
use super::inlet::TaskInlet;
use crate::error::{PoolError, Result};
use crate::target::Target;
use crate::worker::spawn::spawn_thread;

/// What a feeder did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Items enqueued.
    pub submitted: usize,
    /// Items that could not be serialized.
    pub skipped: usize,
    /// True if the inlet closed before the stream ended.
    pub interrupted: bool,
}

/// Handle to the feeder thread.
pub struct Feeder {
    handle: JoinHandle<FeedReport>,
}

/// Clears the inlet's feeding flag however the thread ends.
struct FeedingGuard(Arc<TaskInlet>);

impl Drop for FeedingGuard {
    fn drop(&mut self) {
        self.0.set_feeding(false);
    }
}

impl Feeder {
    pub fn spawn<I>(
        inlet: Arc<TaskInlet>,
        target: Target,
        static_args: Vec<Value>,
        items: I,
    ) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Serialize,
    {
        let items = items.into_iter();
        inlet.set_feeding(true);
        let guard = FeedingGuard(inlet.clone());

        let handle = spawn_thread("pool-feeder".to_string(), move || {
            let _guard = guard;
            feed(&inlet, &target, &static_args, items)
        });
        // A failed spawn drops the closure and with it the guard
        Ok(Self { handle: handle? })
    }

    /// Wait for the feeder to stop.
    pub fn join(self) -> Result<FeedReport> {
        self.handle
            .join()
            .map_err(|_| PoolError::Worker("Feeder thread panicked".into()))
    }
}

fn feed<I>(inlet: &TaskInlet, target: &Target, static_args: &[Value], items: I) -> FeedReport
where
    I: Iterator,
    I::Item: Serialize,
{
    let mut report = FeedReport::default();

    for item in items {
        let value = match serde_json::to_value(item) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping item that cannot be serialized");
                report.skipped += 1;
                continue;
            }
        };

        let payload = target.task_payload(value, static_args);
        match inlet.put(payload, Wait::Block) {
            Ok(_) => report.submitted += 1,
            Err(e) => {
                tracing::debug!(error = %e, submitted = report.submitted, "Feeder stopped early");
                report.interrupted = true;
                break;
            }
        }
    }

    tracing::debug!(
        submitted = report.submitted,
        skipped = report.skipped,
        "Feeder finished"
    );
    report
}
