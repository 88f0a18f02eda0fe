//! Restores submission order over results that complete out of order.

use std::collections::{BTreeMap, BTreeSet};

use super::envelope::ResultEnvelope;

/// Ordering buffer.
///
/// Holds results that arrived ahead of the next expected sequence number.
/// Sequence numbers of tasks discarded before running are recorded as
/// skipped so they never stall the order.
#[derive(Debug, Default)]
pub struct Reorder {
    next: u64,
    pending: BTreeMap<u64, ResultEnvelope>,
    skipped: BTreeSet<u64>,
    limit: Option<usize>,
}

impl Reorder {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Release the next result in order, if it has arrived.
    pub fn take_ready(&mut self) -> Option<ResultEnvelope> {
        loop {
            if self.skipped.remove(&self.next) {
                self.next += 1;
                continue;
            }
            let envelope = self.pending.remove(&self.next)?;
            self.next += 1;
            return Some(envelope);
        }
    }

    /// Buffer a result received from the result channel.
    pub fn insert(&mut self, envelope: ResultEnvelope) {
        if envelope.seq < self.next {
            tracing::warn!(seq = envelope.seq, next = self.next, "Dropping stale result");
            return;
        }
        self.pending.insert(envelope.seq, envelope);
    }

    /// Mark a sequence number that will never produce a result.
    pub fn skip(&mut self, seq: u64) {
        if seq >= self.next {
            self.skipped.insert(seq);
        }
    }

    /// True when another out-of-order result may not be buffered.
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.pending.len() >= limit)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.skipped.clear();
    }
}
