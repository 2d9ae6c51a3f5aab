//! Prometheus metrics of the writers in this process. Every metric is a family labelled by the
//! writer name, so several writers can share the registry.

use std::sync::OnceLock;

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

use crate::error::{Error, Result};

const WRITER_NAME_LABEL: &str = "writer";

// The metrics of the writer are registered under this prefix
const REGISTRY_PREFIX: &str = "batchsink";

// counters (the _total suffix is added by the client library)
const ENTRIES_WRITTEN_TOTAL: &str = "entries_written";
const BATCHES_DISPATCHED_TOTAL: &str = "batches_dispatched";
const ENTRIES_REQUEUED_TOTAL: &str = "entries_requeued";

// gauges
const BUFFERED: &str = "buffered";
const IN_FLIGHT: &str = "in_flight";

// histograms
const BATCH_SIZE: &str = "batch_size";

/// The global register of all metrics.
struct GlobalRegistry {
    // registration happens once per process, a blocking mutex is fine
    registry: parking_lot::Mutex<Registry>,
}

impl GlobalRegistry {
    fn new() -> Self {
        GlobalRegistry {
            registry: parking_lot::Mutex::new(Registry::default()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::new)
}

pub(crate) struct WriterMetrics {
    // counters
    pub(crate) entries_written: Family<Vec<(String, String)>, Counter>,
    pub(crate) batches_dispatched: Family<Vec<(String, String)>, Counter>,
    pub(crate) entries_requeued: Family<Vec<(String, String)>, Counter>,

    // gauges
    pub(crate) buffered: Family<Vec<(String, String)>, Gauge>,
    pub(crate) in_flight: Family<Vec<(String, String)>, Gauge>,

    // histograms
    pub(crate) batch_size: Family<Vec<(String, String)>, Histogram>,
}

impl WriterMetrics {
    fn new() -> Self {
        let metrics = Self {
            entries_written: Family::<Vec<(String, String)>, Counter>::default(),
            batches_dispatched: Family::<Vec<(String, String)>, Counter>::default(),
            entries_requeued: Family::<Vec<(String, String)>, Counter>::default(),
            buffered: Family::<Vec<(String, String)>, Gauge>::default(),
            in_flight: Family::<Vec<(String, String)>, Gauge>::default(),
            // 1 to 2048 entries
            batch_size: Family::<Vec<(String, String)>, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(1.0, 2.0, 12))
            }),
        };

        let mut registry = global_registry().registry.lock();
        let registry = registry.sub_registry_with_prefix(REGISTRY_PREFIX);
        registry.register(
            ENTRIES_WRITTEN_TOTAL,
            "A Counter to keep track of the total number of elements accepted by the writer",
            metrics.entries_written.clone(),
        );
        registry.register(
            BATCHES_DISPATCHED_TOTAL,
            "A Counter to keep track of the total number of batches submitted to the destination",
            metrics.batches_dispatched.clone(),
        );
        registry.register(
            ENTRIES_REQUEUED_TOTAL,
            "A Counter to keep track of the total number of entries requeued for retry",
            metrics.entries_requeued.clone(),
        );
        registry.register(
            BUFFERED,
            "A Gauge to keep track of the number of entries waiting in the buffer",
            metrics.buffered.clone(),
        );
        registry.register(
            IN_FLIGHT,
            "A Gauge to keep track of the number of batches awaiting completion",
            metrics.in_flight.clone(),
        );
        registry.register(
            BATCH_SIZE,
            "A Histogram to keep track of the number of entries per submitted batch",
            metrics.batch_size.clone(),
        );

        metrics
    }
}

static WRITER_METRICS: OnceLock<WriterMetrics> = OnceLock::new();

pub(crate) fn writer_metrics() -> &'static WriterMetrics {
    WRITER_METRICS.get_or_init(WriterMetrics::new)
}

pub(crate) fn writer_metric_labels(writer_name: &str) -> Vec<(String, String)> {
    vec![(WRITER_NAME_LABEL.to_string(), writer_name.to_string())]
}

/// Renders all registered metrics in the OpenMetrics text format.
pub fn encode_metrics() -> Result<String> {
    // make sure the writer metrics are registered even if no writer was built yet
    writer_metrics();
    let registry = global_registry().registry.lock();
    let mut buffer = String::new();
    encode(&mut buffer, &registry)
        .map_err(|e| Error::Metrics(format!("failed to encode metrics: {e}")))?;
    Ok(buffer)
}
