use serde::{Deserialize, Serialize};

/// The entries a writer still holds when a checkpoint is taken.
///
/// After a successful drain this is normally empty. It is handed verbatim to the checkpoint store
/// and, on recovery, back to [crate::AsyncSinkWriterBuilder::restore].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedRequestState<E> {
    entries: Vec<E>,
}

impl<E> BufferedRequestState<E> {
    pub fn new(entries: Vec<E>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<E> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for BufferedRequestState<E> {
    fn default() -> Self {
        Self::empty()
    }
}
