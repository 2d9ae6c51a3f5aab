use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::WriterConfig;
use crate::converter::{ElementConverter, WriteContext};
use crate::destination::Destination;
use crate::error::Error;
use crate::state::BufferedRequestState;
use actor::{WriterActor, WriterActorMessage};

mod actor;

const DEFAULT_WRITER_NAME: &str = "batchsink";
const ACTOR_CHANNEL_SIZE: usize = 16;

/// What [AsyncSinkWriter::prepare_commit] hands to the committer. The drain itself is the commit,
/// so there is never anything to hand over.
pub type Committable = std::convert::Infallible;

/// Point-in-time view of the writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Entries waiting in the buffer.
    pub buffered: usize,
    /// Batches submitted to the destination that have not completed yet.
    pub in_flight: usize,
}

/// AsyncSinkWriter batches request entries and submits them to a [Destination], retrying the
/// entries the destination rejects.
///
/// The writer state lives in a dedicated actor task; this is only a handle to it. Every operation
/// takes `&mut self`, so there is exactly one caller at a time and operations are applied in
/// order. A batch that the destination fails as a whole (see [crate::ResultHandler::fail]) leaves
/// the writer failed: every later operation returns the same [Error::Destination] and the pipeline
/// has to restart from the last snapshot.
pub struct AsyncSinkWriter<In, E> {
    actor_handle: mpsc::Sender<WriterActorMessage<In, E>>,
    actor_task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// AsyncSinkWriterBuilder is a builder to build an [AsyncSinkWriter].
pub struct AsyncSinkWriterBuilder<In, E> {
    name: String,
    config: WriterConfig,
    converter: Box<dyn ElementConverter<In, E>>,
    destination: Box<dyn Destination<E>>,
    restored: Vec<E>,
    cancel: CancellationToken,
}

impl<In, E> AsyncSinkWriterBuilder<In, E>
where
    In: Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(
        config: WriterConfig,
        converter: impl ElementConverter<In, E>,
        destination: impl Destination<E>,
    ) -> Self {
        Self {
            name: DEFAULT_WRITER_NAME.to_string(),
            config,
            converter: Box::new(converter),
            destination: Box::new(destination),
            restored: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Name used in logs and as the metrics label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seeds the buffer with the entries of previously snapshotted states, in order. They are
    /// submitted before any element written to the new writer.
    pub fn restore(mut self, states: impl IntoIterator<Item = BufferedRequestState<E>>) -> Self {
        self.restored
            .extend(states.into_iter().flat_map(BufferedRequestState::into_entries));
        self
    }

    /// Cancelling the token aborts a suspended operation with [Error::Cancelled] and stops the
    /// writer.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validates the config and starts the writer actor. Must be called within a tokio runtime.
    pub fn build(self) -> Result<AsyncSinkWriter<In, E>> {
        self.config.validate()?;

        let (actor_handle, receiver) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let actor = WriterActor::new(
            self.name,
            self.config,
            self.converter,
            self.destination,
            self.restored,
            receiver,
            self.cancel.clone(),
        );
        let actor_task = tokio::spawn(actor.run());

        Ok(AsyncSinkWriter {
            actor_handle,
            actor_task,
            cancel: self.cancel,
        })
    }
}

impl<In, E> AsyncSinkWriter<In, E>
where
    In: Send + 'static,
    E: Clone + Send + 'static,
{
    /// Converts the element and buffers it. Suspends while the buffer is full or, when a batch has
    /// to be submitted, while the in-flight limit is reached.
    pub async fn write(&mut self, element: In, context: WriteContext) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WriterActorMessage::Write {
            element,
            context,
            respond_to: tx,
        })
        .await?;
        self.recv(rx).await?
    }

    /// Drains the writer before a checkpoint: returns once no batch is in flight. With `flush` all
    /// buffered entries are submitted (and retried until persisted) first, so the buffer is empty
    /// as well.
    ///
    /// Without `flush` the drain is only partial: the buffer is not touched and may still hold
    /// entries when this returns, including failed entries requeued by the batches it waited for.
    /// Those entries are not lost, they are carried by [AsyncSinkWriter::snapshot_state]. Waiting
    /// for an empty buffer here would never return, since nothing submits it.
    ///
    /// There is no bound on how long this waits unless
    /// [WriterConfig::in_flight_timeout] is set.
    pub async fn prepare_commit(&mut self, flush: bool) -> Result<Vec<Committable>> {
        let (tx, rx) = oneshot::channel();
        self.send(WriterActorMessage::PrepareCommit {
            flush,
            respond_to: tx,
        })
        .await?;
        self.recv(rx).await?
    }

    /// Returns the buffered entries, to be stored with the checkpoint.
    pub async fn snapshot_state(&mut self) -> Result<BufferedRequestState<E>> {
        let (tx, rx) = oneshot::channel();
        self.send(WriterActorMessage::Snapshot { respond_to: tx })
            .await?;
        self.recv(rx).await?
    }

    pub async fn stats(&mut self) -> Result<WriterStats> {
        let (tx, rx) = oneshot::channel();
        self.send(WriterActorMessage::Stats { respond_to: tx })
            .await?;
        self.recv(rx).await
    }

    /// Stops the writer and releases the destination. Nothing is drained here, call
    /// [AsyncSinkWriter::prepare_commit] first.
    pub async fn close(self) -> Result<()> {
        drop(self.actor_handle);
        self.actor_task
            .await
            .map_err(|e| Error::ActorPatternRecv(format!("writer actor failed: {e}")))
    }

    async fn send(&self, msg: WriterActorMessage<In, E>) -> Result<()> {
        self.actor_handle
            .send(msg)
            .await
            .map_err(|_| self.stopped_error())
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await.map_err(|_| self.stopped_error())
    }

    fn stopped_error(&self) -> Error {
        if self.cancel.is_cancelled() {
            Error::Cancelled("writer was cancelled".to_string())
        } else {
            Error::ActorPatternRecv("writer actor is not running".to_string())
        }
    }
}
