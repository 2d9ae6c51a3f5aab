use std::collections::HashMap;
use std::fmt;

/// Identifier the writer assigns to every dispatched batch. Completions are matched against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Tracks the batches submitted to the destination whose completion has not been observed yet.
///
/// Keeping the ids (not just a count) lets the writer ignore a completion it has already seen
/// instead of decrementing twice.
#[derive(Debug)]
pub(crate) struct InFlightTracker {
    max_in_flight: usize,
    next_id: u64,
    /// batch id to the number of entries in the batch
    outstanding: HashMap<BatchId, usize>,
}

impl InFlightTracker {
    pub(crate) fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight,
            next_id: 0,
            outstanding: HashMap::with_capacity(max_in_flight),
        }
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.outstanding.len() < self.max_in_flight
    }

    /// Registers a new in-flight batch of `entries` entries.
    pub(crate) fn acquire(&mut self, entries: usize) -> BatchId {
        debug_assert!(self.has_capacity(), "in-flight limit exceeded");
        let id = BatchId(self.next_id);
        self.next_id += 1;
        self.outstanding.insert(id, entries);
        id
    }

    /// Marks the batch as completed and returns its size, or `None` if the batch is not in flight.
    pub(crate) fn release(&mut self, id: BatchId) -> Option<usize> {
        self.outstanding.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
