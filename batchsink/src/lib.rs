//! A generic writer that batches request entries for an external destination.
//!
//! Elements written to the [AsyncSinkWriter] are converted into request entries by an
//! [ElementConverter], buffered, and submitted to a [Destination] in batches of at most
//! `max_batch_size` entries with at most `max_in_flight_requests` batches outstanding. Entries the
//! destination reports as failed are put back at the head of the buffer and retried before anything
//! written later.
//!
//! At-least-once delivery is built on [AsyncSinkWriter::prepare_commit]: once it returns, nothing
//! is in flight, and whatever is still buffered is captured by [AsyncSinkWriter::snapshot_state] so
//! it survives a restart.

mod error;
pub use crate::error::{Error, Result};

/// Buffering hints of the writer.
mod config;
pub use crate::config::WriterConfig;

mod buffer;

mod inflight;
pub use crate::inflight::BatchId;

mod converter;
pub use crate::converter::{ElementConverter, WriteContext};

/// The boundary to the system entries are persisted in, plus the builtin destinations.
mod destination;
pub use crate::destination::{
    BatchWriter, BlackholeDestination, Concurrent, Destination, LocalBatchWriter, LogDestination,
    ResultHandler,
};

mod state;
pub use crate::state::BufferedRequestState;

pub mod metrics;

mod writer;
pub use crate::writer::{AsyncSinkWriter, AsyncSinkWriterBuilder, Committable, WriterStats};

#[cfg(test)]
mod test_utils;
