use std::fmt::Debug;

use crate::Result;
use crate::destination::BatchWriter;

/// Logs every entry at `info` and reports all of them as persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDestination;

impl<E> BatchWriter<E> for LogDestination
where
    E: Debug + Send,
{
    async fn write_batch(&self, batch: Vec<E>) -> Result<Vec<E>> {
        let batch_size = batch.len();
        for entry in batch {
            tracing::info!(?entry, batch_size, "Entry");
        }
        Ok(Vec::new())
    }
}
