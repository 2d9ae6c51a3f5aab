use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::Result;
use crate::inflight::BatchId;

pub use blackhole::BlackholeDestination;
pub use log::LogDestination;

/// [BlackholeDestination] accepts every batch and writes it nowhere, the equivalent of `/dev/null`.
#[path = "destination/blackhole.rs"]
mod blackhole;

/// [LogDestination] logs every entry it receives.
#[path = "destination/log.rs"]
mod log;

/// What the destination reported for a batch.
#[derive(Debug)]
pub(crate) enum Outcome<E> {
    /// The call went through; the entries are the ones that were not persisted.
    Completed(Vec<E>),
    /// The call itself failed, nothing is known about which entries were persisted.
    Failed(String),
    /// The [ResultHandler] was dropped without reporting anything.
    Abandoned,
}

/// Completion of one batch, delivered to the writer through its completion mailbox.
#[derive(Debug)]
pub(crate) struct Completion<E> {
    pub(crate) batch_id: BatchId,
    pub(crate) outcome: Outcome<E>,
}

/// Callback handed to the [Destination] together with every batch.
///
/// It can be invoked from any task or thread; the outcome is queued in the writer's mailbox and
/// applied by the writer itself. Both [ResultHandler::complete] and [ResultHandler::fail] consume
/// the handler, so a batch completes at most once. Dropping the handler without calling either is
/// reported as an abandoned batch, which the writer treats like [ResultHandler::fail].
pub struct ResultHandler<E> {
    batch_id: BatchId,
    mailbox: Option<mpsc::UnboundedSender<Completion<E>>>,
}

impl<E> ResultHandler<E> {
    pub(crate) fn new(batch_id: BatchId, mailbox: mpsc::UnboundedSender<Completion<E>>) -> Self {
        Self {
            batch_id,
            mailbox: Some(mailbox),
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Completes the batch. `failed` holds the entries of the batch that were not persisted, they
    /// are retried ahead of any entry written later. Everything else is considered persisted.
    pub fn complete(mut self, failed: Vec<E>) {
        self.send(Outcome::Completed(failed));
    }

    /// Fails the whole call. Use it when the destination cannot say which entries made it.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.send(Outcome::Failed(reason.into()));
    }

    fn send(&mut self, outcome: Outcome<E>) {
        let Some(mailbox) = self.mailbox.take() else {
            return;
        };
        let completion = Completion {
            batch_id: self.batch_id,
            outcome,
        };
        if mailbox.send(completion).is_err() {
            warn!(batch_id = %self.batch_id, "Writer is closed, dropping batch completion");
        }
    }
}

impl<E> Drop for ResultHandler<E> {
    fn drop(&mut self) {
        self.send(Outcome::Abandoned);
    }
}

/// The boundary to the system the entries are persisted in.
///
/// `submit` must not wait for the batch to be persisted: it starts the request and returns, and
/// the outcome is reported later through the [ResultHandler].
pub trait Destination<E>: Send + 'static {
    fn submit(&mut self, batch: Vec<E>, result: ResultHandler<E>);
}

/// A destination that can be written one batch at a time with an async call.
///
/// Returns the entries that were not persisted. An `Err` means the call failed as a whole.
/// Wrap it in [Concurrent] to use it as a [Destination].
#[trait_variant::make(BatchWriter: Send)]
#[allow(async_fn_in_trait)]
pub trait LocalBatchWriter<E> {
    async fn write_batch(&self, batch: Vec<E>) -> Result<Vec<E>>;
}

/// Adapts a [BatchWriter] to the [Destination] boundary by running every batch on its own tokio
/// task. The number of concurrent tasks is bounded by the writer's in-flight limit.
pub struct Concurrent<W> {
    writer: Arc<W>,
}

impl<W> Concurrent<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(writer),
        }
    }
}

impl<W, E> Destination<E> for Concurrent<W>
where
    W: BatchWriter<E> + Sync + 'static,
    E: Send + 'static,
{
    fn submit(&mut self, batch: Vec<E>, result: ResultHandler<E>) {
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            match writer.write_batch(batch).await {
                Ok(failed) => result.complete(failed),
                Err(e) => result.fail(e.to_string()),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::inflight::InFlightTracker;

    struct EvenOnly;

    impl BatchWriter<u32> for EvenOnly {
        async fn write_batch(&self, batch: Vec<u32>) -> Result<Vec<u32>> {
            Ok(batch.into_iter().filter(|n| n % 2 == 1).collect())
        }
    }

    struct Broken;

    impl BatchWriter<u32> for Broken {
        async fn write_batch(&self, _batch: Vec<u32>) -> Result<Vec<u32>> {
            Err(Error::Destination("connection reset".to_string()))
        }
    }

    fn handler<E>(
        tracker: &mut InFlightTracker,
    ) -> (ResultHandler<E>, mpsc::UnboundedReceiver<Completion<E>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResultHandler::new(tracker.acquire(1), tx), rx)
    }

    #[test]
    fn test_complete_sends_once() {
        let mut tracker = InFlightTracker::new(1);
        let (result, mut rx) = handler(&mut tracker);
        let batch_id = result.batch_id();
        result.complete(vec!["b"]);

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.batch_id, batch_id);
        assert!(
            matches!(completion.outcome, Outcome::Completed(ref failed) if failed == &vec!["b"])
        );

        // the drop after complete must not report the batch as abandoned
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_handler_is_abandoned() {
        let mut tracker = InFlightTracker::new(1);
        let (result, mut rx) = handler::<u8>(&mut tracker);
        drop(result);

        let completion = rx.try_recv().unwrap();
        assert!(matches!(completion.outcome, Outcome::Abandoned));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_mailbox_does_not_panic() {
        let mut tracker = InFlightTracker::new(1);
        let (result, rx) = handler::<u8>(&mut tracker);
        drop(rx);
        result.fail("gone");
    }

    #[tokio::test]
    async fn test_concurrent_reports_failed_entries() {
        let mut tracker = InFlightTracker::new(1);
        let (result, mut rx) = handler(&mut tracker);
        let mut destination = Concurrent::new(EvenOnly);
        destination.submit(vec![1, 2, 3, 4], result);

        let completion = rx.recv().await.unwrap();
        assert!(
            matches!(completion.outcome, Outcome::Completed(ref failed) if failed == &vec![1, 3])
        );
    }

    #[tokio::test]
    async fn test_concurrent_reports_call_failure() {
        let mut tracker = InFlightTracker::new(1);
        let (result, mut rx) = handler(&mut tracker);
        let mut destination = Concurrent::new(Broken);
        destination.submit(vec![1], result);

        let completion = rx.recv().await.unwrap();
        let Outcome::Failed(reason) = completion.outcome else {
            panic!("expected the call to fail");
        };
        assert!(reason.contains("connection reset"));
    }
}
