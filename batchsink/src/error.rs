use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),

    /// The destination failed a whole batch instead of reporting per-entry failures. The writer
    /// cannot tell which entries were persisted, so it stays failed from here on.
    #[error("Destination Error - {0}")]
    Destination(String),

    #[error("In-flight Timeout - {in_flight} batches still outstanding after {timeout:?}")]
    InFlightTimeout { in_flight: usize, timeout: Duration },

    #[error("Cancelled - {0}")]
    Cancelled(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),
}
