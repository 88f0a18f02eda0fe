//! Short-lived cache for the pool's liveness answer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::lock;

/// How long a liveness answer stays valid.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(5);

/// Cached result of polling every worker.
#[derive(Debug)]
pub struct LivenessCache {
    window: Duration,
    cached: Mutex<Option<(bool, Instant)>>,
}

impl Default for LivenessCache {
    fn default() -> Self {
        Self::new(LIVENESS_WINDOW)
    }
}

impl LivenessCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            cached: Mutex::new(None),
        }
    }

    /// The cached answer, if it is still fresh.
    pub fn get(&self) -> Option<bool> {
        match *lock(&self.cached) {
            Some((alive, at)) if at.elapsed() < self.window => Some(alive),
            _ => None,
        }
    }

    pub fn set(&self, alive: bool) {
        *lock(&self.cached) = Some((alive, Instant::now()));
    }

    pub fn invalidate(&self) {
        *lock(&self.cached) = None;
    }
}
