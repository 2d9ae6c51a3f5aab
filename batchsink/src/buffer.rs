use std::collections::VecDeque;

/// Bounded buffer of request entries waiting to be submitted.
///
/// New writes are appended at the tail while failed entries are requeued at the head, so a retry is
/// always dispatched before anything written after the failure was reported. The capacity is not
/// enforced here: the writer checks [RequestBuffer::is_full] before accepting a new element, and a
/// requeue may briefly take the buffer past its capacity.
#[derive(Debug)]
pub(crate) struct RequestBuffer<E> {
    entries: VecDeque<E>,
    capacity: usize,
}

impl<E> RequestBuffer<E> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates a buffer seeded with entries recovered from a snapshot, in snapshot order.
    pub(crate) fn with_entries(capacity: usize, entries: impl IntoIterator<Item = E>) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.entries.extend(entries);
        buffer
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub(crate) fn push_back(&mut self, entry: E) {
        self.entries.push_back(entry);
    }

    /// Puts failed entries back at the head. The first failed entry becomes the new head.
    pub(crate) fn requeue(&mut self, failed: Vec<E>) {
        for entry in failed.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    /// Removes up to `max` entries from the head, preserving their order.
    pub(crate) fn take_batch(&mut self, max: usize) -> Vec<E> {
        let batch_size = max.min(self.entries.len());
        self.entries.drain(..batch_size).collect()
    }
}

impl<E: Clone> RequestBuffer<E> {
    pub(crate) fn snapshot(&self) -> Vec<E> {
        self.entries.iter().cloned().collect()
    }
}
