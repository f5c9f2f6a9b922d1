//! Custograph - customer knowledge-graph extraction and persistence engine
//!
//! Turns structured customer-analysis outputs (file analysis, psychological
//! needs analysis) into typed, evidence-backed knowledge graphs and drives
//! them into a graph database through an idempotent bulk-upload pipeline.
//!
//! # Pipeline
//! - Entity extraction: typed, deduplicated entity records per customer
//! - Relationship extraction: deterministic domain rules plus a pluggable
//!   similarity heuristic for generic edges
//! - Graph assembly: one immutable snapshot per extraction, with quality
//!   metrics, written atomically to the extraction store
//! - Bulk upload: at-least-once delivery into the graph database with an
//!   append-only per-extraction upload ledger
//!
//! # Isolation
//! Every record is scoped by customer id. The upload coordinator refuses to
//! touch data for any customer other than the one it was invoked for.

pub mod analysis;
pub mod assembler;
pub mod config;
pub mod entity_extractor;
pub mod errors;
pub mod graph;
pub mod graph_db;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod relationship_extractor;
pub mod store;
pub mod uploader;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use async_trait;
pub use chrono;
pub use uuid;

/// Initialize console logging honoring `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
