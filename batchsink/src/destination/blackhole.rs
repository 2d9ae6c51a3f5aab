use crate::Result;
use crate::destination::BatchWriter;

/// Blackhole is a destination to emulate /dev/null
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackholeDestination;

impl<E: Send> BatchWriter<E> for BlackholeDestination {
    async fn write_batch(&self, _batch: Vec<E>) -> Result<Vec<E>> {
        Ok(Vec::new())
    }
}
