//! Operational metrics with Prometheus
//!
//! Exposes the counters and histograms that matter for running the pipeline:
//! - Extraction rates, failures and graph sizes
//! - Upload attempts, retries, timeouts and terminal outcomes
//! - Store and ledger operation latencies
//!
//! NOTE: customer_id is intentionally kept out of metric labels to prevent
//! high-cardinality explosion.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Extraction Metrics
    // ============================================================================

    /// Extraction runs by terminal result
    pub static ref EXTRACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_extractions_total", "Total extraction runs"),
        &["result"]  // result: "success", "missing_subject", "empty_graph", "error"
    ).unwrap();

    /// End-to-end extraction duration
    pub static ref EXTRACTION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "custograph_extraction_duration_seconds",
            "End-to-end extraction pipeline duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5])
    ).unwrap();

    /// Entities emitted per extraction
    pub static ref ENTITIES_EXTRACTED: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "custograph_entities_extracted",
            "Entities emitted per extraction"
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &["entity_type"]
    ).unwrap();

    /// Relationships emitted per extraction
    pub static ref RELATIONSHIPS_EXTRACTED: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "custograph_relationships_extracted",
            "Relationships emitted per extraction"
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0])
    ).unwrap();

    /// Relationship candidates dropped for missing evidence
    pub static ref EVIDENCELESS_EDGES_REJECTED: IntCounter = IntCounter::new(
        "custograph_evidenceless_edges_rejected_total",
        "Relationship candidates dropped because they carried no evidence"
    ).unwrap();

    /// Duplicate entities merged during deduplication
    pub static ref ENTITIES_MERGED: IntCounter = IntCounter::new(
        "custograph_entities_merged_total",
        "Duplicate entities merged during deduplication"
    ).unwrap();

    // ============================================================================
    // Upload Metrics
    // ============================================================================

    /// Upload attempts by result
    pub static ref UPLOAD_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_upload_attempts_total", "Total upload attempts"),
        &["result"]  // result: "succeeded", "failed", "timeout", "retried"
    ).unwrap();

    /// Extractions reaching a terminal upload state
    pub static ref UPLOADS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_uploads_completed_total", "Extractions reaching a terminal upload state"),
        &["status"]  // status: "succeeded", "failed"
    ).unwrap();

    /// Per-extraction upload duration (all attempts, including backoff)
    pub static ref UPLOAD_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "custograph_upload_duration_seconds",
            "Per-extraction upload duration including retries"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    ).unwrap();

    /// Vertices written to the graph database
    pub static ref VERTICES_UPSERTED_TOTAL: IntCounter = IntCounter::new(
        "custograph_vertices_upserted_total",
        "Total vertex upserts issued to the graph database"
    ).unwrap();

    /// Edges written to the graph database
    pub static ref EDGES_UPSERTED_TOTAL: IntCounter = IntCounter::new(
        "custograph_edges_upserted_total",
        "Total edge upserts issued to the graph database"
    ).unwrap();

    /// Batch runs currently in flight
    pub static ref UPLOAD_BATCHES_IN_FLIGHT: IntGauge = IntGauge::new(
        "custograph_upload_batches_in_flight",
        "Bulk upload batch runs currently in flight"
    ).unwrap();

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Extraction store operations
    pub static ref STORE_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_store_ops_total", "Total extraction store operations"),
        &["operation", "result"]  // operation: "write", "read", "list"
    ).unwrap();

    /// Extraction store operation duration
    pub static ref STORE_OPS_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "custograph_store_ops_duration_seconds",
            "Extraction store operation duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.25]),
        &["operation"]
    ).unwrap();

    /// Upload ledger operations
    pub static ref LEDGER_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_ledger_ops_total", "Total upload ledger operations"),
        &["operation", "result"]  // operation: "append", "scan"
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Total errors by code
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("custograph_errors_total", "Total errors by code"),
        &["error_code", "stage"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    // Extraction metrics
    METRICS_REGISTRY.register(Box::new(EXTRACTIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(EXTRACTION_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(ENTITIES_EXTRACTED.clone()))?;
    METRICS_REGISTRY.register(Box::new(RELATIONSHIPS_EXTRACTED.clone()))?;
    METRICS_REGISTRY.register(Box::new(EVIDENCELESS_EDGES_REJECTED.clone()))?;
    METRICS_REGISTRY.register(Box::new(ENTITIES_MERGED.clone()))?;

    // Upload metrics
    METRICS_REGISTRY.register(Box::new(UPLOAD_ATTEMPTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(UPLOADS_COMPLETED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(UPLOAD_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(VERTICES_UPSERTED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(EDGES_UPSERTED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(UPLOAD_BATCHES_IN_FLIGHT.clone()))?;

    // Storage metrics
    METRICS_REGISTRY.register(Box::new(STORE_OPS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(STORE_OPS_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(LEDGER_OPS_TOTAL.clone()))?;

    // Error metrics
    METRICS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
#[allow(unused)]  // Public API utility for metrics consumers
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

#[allow(unused)]  // Public API utility
impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
