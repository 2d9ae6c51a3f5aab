//! Pipes stdin through an [AsyncSinkWriter] into the log destination, one entry per line, taking
//! a checkpoint every `--checkpoint-every` lines (default 1000).

use std::env;
use std::error::Error;

use batchsink::{AsyncSinkWriterBuilder, Concurrent, LogDestination, WriteContext, WriterConfig};
use chrono::Utc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod setup_tracing;

const DEFAULT_CHECKPOINT_EVERY: usize = 1000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

fn checkpoint_every(args: &[String]) -> Result<usize, Box<dyn Error>> {
    let Some(pos) = args.iter().position(|arg| arg == "--checkpoint-every") else {
        return Ok(DEFAULT_CHECKPOINT_EVERY);
    };
    let value = args
        .get(pos + 1)
        .ok_or("--checkpoint-every requires a value")?;
    let every: usize = value
        .parse()
        .map_err(|e| format!("invalid --checkpoint-every {value:?}: {e}"))?;
    if every == 0 {
        return Err("--checkpoint-every must be greater than 0".into());
    }
    Ok(every)
}

async fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let checkpoint_every = checkpoint_every(&args)?;
    let config = WriterConfig::load(env::vars())?;
    info!(?config, checkpoint_every, "Starting with config");

    let cln_token = CancellationToken::new();
    let shutdown_token = cln_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, shutting down");
            shutdown_token.cancel();
        }
    });

    let mut writer = AsyncSinkWriterBuilder::new(
        config,
        |line: String, _: &WriteContext| line,
        Concurrent::new(LogDestination),
    )
    .name("stdin")
    .cancellation_token(cln_token.clone())
    .build()?;

    let mut lines = LinesStream::new(BufReader::new(io::stdin()).lines());
    let mut written = 0usize;
    while let Some(line) = lines.next().await {
        writer.write(line?, WriteContext::new(Utc::now())).await?;
        written += 1;

        if written % checkpoint_every == 0 {
            writer.prepare_commit(true).await?;
            let state = writer.snapshot_state().await?;
            info!(written, residual = state.len(), "Checkpoint complete");
        }
    }

    writer.prepare_commit(true).await?;
    let state = writer.snapshot_state().await?;
    info!(written, residual = state.len(), "Input exhausted, writer drained");
    writer.close().await?;

    debug!(metrics = %batchsink::metrics::encode_metrics()?, "Final metrics");
    Ok(())
}
