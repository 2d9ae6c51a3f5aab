use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::buffer::RequestBuffer;
use crate::config::WriterConfig;
use crate::converter::{ElementConverter, WriteContext};
use crate::destination::{Completion, Destination, Outcome, ResultHandler};
use crate::error::Error;
use crate::inflight::InFlightTracker;
use crate::metrics::{writer_metric_labels, writer_metrics};
use crate::state::BufferedRequestState;
use crate::writer::{Committable, WriterStats};

/// WriterActorMessage is a message that is sent to the WriterActor.
pub(super) enum WriterActorMessage<In, E> {
    Write {
        element: In,
        context: WriteContext,
        respond_to: oneshot::Sender<Result<()>>,
    },
    PrepareCommit {
        flush: bool,
        respond_to: oneshot::Sender<Result<Vec<Committable>>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Result<BufferedRequestState<E>>>,
    },
    Stats {
        respond_to: oneshot::Sender<WriterStats>,
    },
}

/// WriterActor owns the buffer and the in-flight batches of one writer. Commands from the handle
/// and batch completions from the destination are both processed on this single task, which is
/// what keeps retries ahead of newer writes without any locking.
pub(super) struct WriterActor<In, E> {
    name: String,
    config: WriterConfig,
    converter: Box<dyn ElementConverter<In, E>>,
    destination: Box<dyn Destination<E>>,
    buffer: RequestBuffer<E>,
    in_flight: InFlightTracker,
    actor_messages: mpsc::Receiver<WriterActorMessage<In, E>>,
    /// cloned into every [ResultHandler]
    completions_tx: mpsc::UnboundedSender<Completion<E>>,
    completions: mpsc::UnboundedReceiver<Completion<E>>,
    /// set once the destination failed a batch as a whole; every later operation returns it
    failure: Option<Error>,
    cancel: CancellationToken,
    labels: Vec<(String, String)>,
}

impl<In, E> WriterActor<In, E>
where
    In: Send + 'static,
    E: Clone + Send + 'static,
{
    pub(super) fn new(
        name: String,
        config: WriterConfig,
        converter: Box<dyn ElementConverter<In, E>>,
        destination: Box<dyn Destination<E>>,
        restored: Vec<E>,
        actor_messages: mpsc::Receiver<WriterActorMessage<In, E>>,
        cancel: CancellationToken,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let labels = writer_metric_labels(&name);
        Self {
            buffer: RequestBuffer::with_entries(config.max_buffered_requests, restored),
            in_flight: InFlightTracker::new(config.max_in_flight_requests),
            name,
            config,
            converter,
            destination,
            actor_messages,
            completions_tx,
            completions,
            failure: None,
            cancel,
            labels,
        }
    }

    pub(super) async fn run(mut self) {
        info!(
            writer = %self.name,
            max_batch_size = self.config.max_batch_size,
            max_in_flight_requests = self.config.max_in_flight_requests,
            max_buffered_requests = self.config.max_buffered_requests,
            in_flight_timeout = ?self.config.in_flight_timeout,
            restored = self.buffer.len(),
            "Starting async sink writer"
        );
        self.record_gauges();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(writer = %self.name, "Cancellation received, stopping writer");
                    break;
                }
                msg = self.actor_messages.recv() => {
                    let Some(msg) = msg else {
                        // all handles are gone
                        break;
                    };
                    self.handle_message(msg).await;
                }
                Some(completion) = self.completions.recv() => {
                    // a fatal outcome is kept in `self.failure` and reported to the next caller
                    let _ = self.apply_completion(completion);
                    self.record_gauges();
                }
            }
        }

        if !self.buffer.is_empty() || !self.in_flight.is_empty() {
            warn!(
                writer = %self.name,
                buffered = self.buffer.len(),
                in_flight = self.in_flight.len(),
                "Writer stopped before it was drained"
            );
        }
        info!(writer = %self.name, "Async sink writer stopped");
    }

    async fn handle_message(&mut self, msg: WriterActorMessage<In, E>) {
        match msg {
            WriterActorMessage::Write {
                element,
                context,
                respond_to,
            } => {
                let result = self.write(element, context).await;
                let _ = respond_to.send(result);
            }
            WriterActorMessage::PrepareCommit { flush, respond_to } => {
                let result = self.prepare_commit(flush).await.map(|_| Vec::new());
                let _ = respond_to.send(result);
            }
            WriterActorMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot_state());
            }
            WriterActorMessage::Stats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }
        }
        self.record_gauges();
    }

    /// Buffers one element. Suspends while the buffer is at capacity and flushes every full batch
    /// it leaves behind.
    async fn write(&mut self, element: In, context: WriteContext) -> Result<()> {
        self.ensure_healthy()?;
        self.poll_completions()?;

        // Requeued failures can fill the buffer, so we drain it actively instead of only waiting.
        while self.buffer.is_full() {
            self.flush().await?;
        }

        let entry = self.converter.apply(element, &context);
        self.buffer.push_back(entry);
        writer_metrics()
            .entries_written
            .get_or_create(&self.labels)
            .inc();

        while self.buffer.len() >= self.config.max_batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Submits up to one batch from the head of the buffer. Suspends while the in-flight limit is
    /// reached.
    async fn flush(&mut self) -> Result<()> {
        while !self.in_flight.has_capacity() {
            self.await_completion().await?;
        }
        self.poll_completions()?;

        let batch = self.buffer.take_batch(self.config.max_batch_size);
        if batch.is_empty() {
            return Ok(());
        }

        let batch_size = batch.len();
        let batch_id = self.in_flight.acquire(batch_size);
        debug!(
            writer = %self.name,
            %batch_id,
            batch_size,
            in_flight = self.in_flight.len(),
            buffered = self.buffer.len(),
            "Submitting batch"
        );

        let metrics = writer_metrics();
        metrics
            .batches_dispatched
            .get_or_create(&self.labels)
            .inc();
        metrics
            .batch_size
            .get_or_create(&self.labels)
            .observe(batch_size as f64);

        let result = ResultHandler::new(batch_id, self.completions_tx.clone());
        self.destination.submit(batch, result);
        Ok(())
    }

    /// Waits until nothing is in flight. With `flush` the buffer is submitted as well, so on return
    /// the buffer is empty too. Without it the buffer may still be non-empty on return, and the
    /// remaining entries stay for the snapshot.
    async fn prepare_commit(&mut self, flush: bool) -> Result<()> {
        self.ensure_healthy()?;
        self.poll_completions()?;

        loop {
            if flush && !self.buffer.is_empty() {
                self.flush().await?;
            } else if self.in_flight.is_empty() {
                break;
            } else {
                self.await_completion().await?;
            }
        }

        debug!(
            writer = %self.name,
            flush,
            buffered = self.buffer.len(),
            "Writer drained for checkpoint"
        );
        Ok(())
    }

    fn snapshot_state(&mut self) -> Result<BufferedRequestState<E>> {
        self.ensure_healthy()?;
        self.poll_completions()?;

        if !self.in_flight.is_empty() {
            warn!(
                writer = %self.name,
                in_flight = self.in_flight.len(),
                "Snapshot taken with batches in flight, their entries are not part of the state"
            );
        }
        Ok(BufferedRequestState::new(self.buffer.snapshot()))
    }

    fn stats(&self) -> WriterStats {
        WriterStats {
            buffered: self.buffer.len(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Suspends until the next batch completes and applies it.
    async fn await_completion(&mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        let timeout = self.config.in_flight_timeout;
        let next_completion = async {
            match timeout {
                Some(timeout) => time::timeout(timeout, self.completions.recv()).await,
                None => Ok(self.completions.recv().await),
            }
        };

        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled(
                    "writer cancelled while waiting for in-flight batches".to_string(),
                ));
            }
            completion = next_completion => completion,
        };

        match completion {
            Ok(Some(completion)) => self.apply_completion(completion),
            // we hold a sender ourselves, so this only happens if the actor is torn down
            Ok(None) => Err(Error::ActorPatternRecv("completion mailbox closed".to_string())),
            Err(_) => {
                let err = Error::InFlightTimeout {
                    in_flight: self.in_flight.len(),
                    timeout: timeout.unwrap_or_default(),
                };
                Err(self.fail(err))
            }
        }
    }

    /// Applies every completion that is already queued, without waiting.
    fn poll_completions(&mut self) -> Result<()> {
        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion)?;
        }
        Ok(())
    }

    fn apply_completion(&mut self, completion: Completion<E>) -> Result<()> {
        let Completion { batch_id, outcome } = completion;
        let Some(batch_size) = self.in_flight.release(batch_id) else {
            warn!(
                writer = %self.name,
                %batch_id,
                "Completion for a batch that is not in flight, ignoring"
            );
            return Ok(());
        };

        match outcome {
            Outcome::Completed(failed) if failed.is_empty() => {
                debug!(writer = %self.name, %batch_id, batch_size, "Batch persisted");
                Ok(())
            }
            Outcome::Completed(failed) => {
                warn!(
                    writer = %self.name,
                    %batch_id,
                    batch_size,
                    failed = failed.len(),
                    "Requeueing failed entries for retry"
                );
                writer_metrics()
                    .entries_requeued
                    .get_or_create(&self.labels)
                    .inc_by(failed.len() as u64);
                self.buffer.requeue(failed);
                Ok(())
            }
            Outcome::Failed(reason) => {
                Err(self.fail(Error::Destination(format!("{batch_id} failed: {reason}"))))
            }
            Outcome::Abandoned => Err(self.fail(Error::Destination(format!(
                "{batch_id} was dropped by the destination without being completed"
            )))),
        }
    }

    /// Marks the writer as failed. Only the first failure is kept.
    fn fail(&mut self, err: Error) -> Error {
        error!(
            writer = %self.name,
            ?err,
            "Writer failed, restart from the last checkpoint is required"
        );
        self.failure.get_or_insert(err).clone()
    }

    fn ensure_healthy(&self) -> Result<()> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn record_gauges(&self) {
        let metrics = writer_metrics();
        metrics
            .buffered
            .get_or_create(&self.labels)
            .set(self.buffer.len() as i64);
        metrics
            .in_flight
            .get_or_create(&self.labels)
            .set(self.in_flight.len() as i64);
    }
}
