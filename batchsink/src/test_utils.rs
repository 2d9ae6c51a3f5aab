//! Destinations for tests that let the test decide when and how batches complete.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::converter::WriteContext;
use crate::destination::{Destination, ResultHandler};

/// A batch as seen by the destination, together with the handler to complete it.
pub(crate) struct SubmittedBatch<E> {
    pub(crate) entries: Vec<E>,
    pub(crate) result: ResultHandler<E>,
}

/// Forwards every submitted batch to the test without completing it.
pub(crate) struct ScriptedDestination<E> {
    submitted: mpsc::UnboundedSender<SubmittedBatch<E>>,
}

pub(crate) fn scripted_destination<E>() -> (
    ScriptedDestination<E>,
    mpsc::UnboundedReceiver<SubmittedBatch<E>>,
) {
    let (submitted, rx) = mpsc::unbounded_channel();
    (ScriptedDestination { submitted }, rx)
}

impl<E: Send + 'static> Destination<E> for ScriptedDestination<E> {
    fn submit(&mut self, batch: Vec<E>, result: ResultHandler<E>) {
        let _ = self.submitted.send(SubmittedBatch {
            entries: batch,
            result,
        });
    }
}

/// Completes every batch as soon as it is submitted, reporting the entries returned by `failed` as
/// not persisted. Resolves to all submitted batches once the writer releases the destination.
pub(crate) fn spawn_responder<E, F>(
    mut submitted: mpsc::UnboundedReceiver<SubmittedBatch<E>>,
    mut failed: F,
) -> JoinHandle<Vec<Vec<E>>>
where
    E: Clone + Send + 'static,
    F: FnMut(&[E]) -> Vec<E> + Send + 'static,
{
    tokio::spawn(async move {
        let mut batches = Vec::new();
        while let Some(batch) = submitted.recv().await {
            let failed_entries = failed(&batch.entries);
            batches.push(batch.entries);
            batch.result.complete(failed_entries);
        }
        batches
    })
}

pub(crate) fn to_entry(element: &'static str, _context: &WriteContext) -> String {
    element.to_string()
}
