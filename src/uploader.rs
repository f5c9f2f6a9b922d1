//! Bulk upload coordinator
//!
//! Discovers pending snapshots for one customer and drives them into the
//! graph database with at-least-once delivery. Safety comes from three
//! properties working together:
//! - vertex/edge upserts are keyed by content-derived ids, so re-driving a
//!   snapshot never duplicates records
//! - every state transition is appended to the upload ledger before or
//!   after the side effect it describes, so a crash leaves an accurate
//!   partial-progress record
//! - vertices are always written before any edge referencing them, since
//!   the graph database does not auto-create endpoints
//!
//! Extractions for one customer are processed strictly sequentially;
//! different customers may run in parallel because nothing here is shared
//! across customer ids.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::config::UploadConfig;
use crate::errors::{PipelineError, Result};
use crate::graph::{entity_properties, relationship_properties};
use crate::graph_db::GraphDatabase;
use crate::ledger::{UploadLedger, UploadRecord, UploadStatus};
use crate::metrics::{
    Timer, EDGES_UPSERTED_TOTAL, UPLOADS_COMPLETED_TOTAL, UPLOAD_ATTEMPTS_TOTAL,
    UPLOAD_BATCHES_IN_FLIGHT, UPLOAD_DURATION, VERTICES_UPSERTED_TOTAL,
};
use crate::store::ExtractionStore;
use crate::validation::validate_customer_id;

/// Invocation contract for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadRequest {
    pub customer_id: String,
    /// Discovery and validation only, no graph-database writes and no
    /// ledger transitions
    #[serde(default)]
    pub dry_run: bool,
}

/// Batch run outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUploadReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_seconds: f64,
}

pub struct BulkUploadCoordinator {
    store: Arc<dyn ExtractionStore>,
    db: Arc<dyn GraphDatabase>,
    ledger: Arc<UploadLedger>,
    config: UploadConfig,
}

impl BulkUploadCoordinator {
    pub fn new(
        store: Arc<dyn ExtractionStore>,
        db: Arc<dyn GraphDatabase>,
        ledger: Arc<UploadLedger>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            db,
            ledger,
            config,
        }
    }

    /// Run a batch to completion
    pub async fn run(&self, request: &BulkUploadRequest) -> Result<BulkUploadReport> {
        self.run_with_cancel(request, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Run a batch with cooperative cancellation
    ///
    /// The flag is checked between extractions only: an in-flight single
    /// extraction always completes or fails with a ledger record, never
    /// left half-applied without one.
    pub async fn run_with_cancel(
        &self,
        request: &BulkUploadRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<BulkUploadReport> {
        validate_customer_id(&request.customer_id)?;

        UPLOAD_BATCHES_IN_FLIGHT.inc();
        let result = self.run_inner(request, cancel).await;
        UPLOAD_BATCHES_IN_FLIGHT.dec();
        result
    }

    async fn run_inner(
        &self,
        request: &BulkUploadRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<BulkUploadReport> {
        let started = Instant::now();
        let customer_id = &request.customer_id;

        let eligible = self.discover(customer_id).await?;
        info!(
            customer_id,
            pending = eligible.len(),
            dry_run = request.dry_run,
            "Bulk upload batch starting"
        );

        if request.dry_run {
            // Validate that every eligible snapshot loads and is scoped to
            // this customer, without writing anything
            for extraction_id in &eligible {
                let snapshot = self
                    .with_timeout("get_snapshot", self.store.get_snapshot(customer_id, extraction_id))
                    .await?;
                self.check_customer(customer_id, &snapshot.customer_id)?;
            }
            return Ok(BulkUploadReport {
                processed: eligible.len(),
                succeeded: 0,
                failed: 0,
                duration_seconds: started.elapsed().as_secs_f64(),
            });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut processed = 0usize;

        for extraction_id in &eligible {
            if cancel.load(Ordering::SeqCst) {
                info!(customer_id, processed, "Batch cancelled between extractions");
                break;
            }
            processed += 1;

            match self.upload_one(customer_id, extraction_id).await {
                Ok(()) => succeeded += 1,
                Err(err) if err.is_retryable() => {
                    // Retry budget exhausted inside upload_one; the ledger
                    // already holds the FAILED record
                    failed += 1;
                }
                Err(err) => {
                    error!(customer_id, extraction_id, error = %err, "Fatal error, aborting batch");
                    return Err(err);
                }
            }
        }

        let report = BulkUploadReport {
            processed,
            succeeded,
            failed,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            customer_id,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "Bulk upload batch finished"
        );
        Ok(report)
    }

    /// Snapshots without a SUCCEEDED ledger record, oldest first
    async fn discover(&self, customer_id: &str) -> Result<Vec<String>> {
        let extraction_ids = self
            .with_timeout("list_extractions", self.store.list_extractions(customer_id))
            .await?;
        let records: HashMap<String, UploadRecord> =
            self.ledger.latest_for_customer(customer_id)?;

        for record in records.values() {
            self.check_customer(customer_id, &record.customer_id)?;
        }

        Ok(extraction_ids
            .into_iter()
            .filter(|id| {
                records
                    .get(id)
                    .map(|r| !r.status.is_terminal())
                    .unwrap_or(true)
            })
            .collect())
    }

    /// Upload one extraction through the retry loop
    ///
    /// Returns Ok on SUCCEEDED. A retryable error return means the retry
    /// budget is exhausted and FAILED is recorded; a fatal error return
    /// means the batch must abort.
    async fn upload_one(&self, customer_id: &str, extraction_id: &str) -> Result<()> {
        let _timer = Timer::new(UPLOAD_DURATION.clone());

        let base_attempts = self
            .ledger
            .latest(customer_id, extraction_id)?
            .map(|r| {
                // A stale record from a different customer under this key
                // would mean ledger corruption
                self.check_customer(customer_id, &r.customer_id)?;
                Ok::<u32, PipelineError>(r.attempt_count)
            })
            .transpose()?
            .unwrap_or(0);

        self.ledger
            .append(&UploadRecord::pending(customer_id, extraction_id))?;

        let mut last_error: Option<PipelineError> = None;

        for attempt in 1..=self.config.max_attempts {
            let attempt_count = base_attempts + attempt;

            let mut record = UploadRecord::pending(customer_id, extraction_id);
            record.status = UploadStatus::InProgress;
            record.attempt_count = attempt_count;
            self.ledger.append(&record)?;

            match self.upload_snapshot(customer_id, extraction_id).await {
                Ok((nodes_written, edges_written)) => {
                    record.status = UploadStatus::Succeeded;
                    record.nodes_written = nodes_written;
                    record.edges_written = edges_written;
                    self.ledger.append(&record)?;

                    UPLOAD_ATTEMPTS_TOTAL.with_label_values(&["succeeded"]).inc();
                    UPLOADS_COMPLETED_TOTAL.with_label_values(&["succeeded"]).inc();
                    info!(
                        customer_id,
                        extraction_id,
                        attempt = attempt_count,
                        nodes_written,
                        edges_written,
                        "Extraction uploaded"
                    );
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    record.status = UploadStatus::Failed;
                    record.last_error = Some(err.message());
                    if let PipelineError::PartialUploadFailure {
                        nodes_written,
                        edges_written,
                        ..
                    } = &err
                    {
                        record.nodes_written = *nodes_written;
                        record.edges_written = *edges_written;
                    }
                    self.ledger.append(&record)?;

                    let label = match err {
                        PipelineError::UploadTimeout { .. } => "timeout",
                        _ => "failed",
                    };
                    UPLOAD_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();
                    warn!(
                        customer_id,
                        extraction_id,
                        attempt = attempt_count,
                        error = %err,
                        "Upload attempt failed"
                    );
                    last_error = Some(err);

                    if attempt < self.config.max_attempts {
                        // FAILED -> PENDING: back onto the queue for the
                        // next attempt
                        record.status = UploadStatus::Pending;
                        record.last_error = None;
                        self.ledger.append(&record)?;
                        UPLOAD_ATTEMPTS_TOTAL.with_label_values(&["retried"]).inc();

                        let backoff = self.config.backoff_base * 2u32.pow(attempt - 1);
                        sleep(backoff).await;
                    }
                }
                Err(err) => {
                    record.status = UploadStatus::Failed;
                    record.last_error = Some(err.message());
                    self.ledger.append(&record)?;
                    UPLOADS_COMPLETED_TOTAL.with_label_values(&["failed"]).inc();
                    return Err(err);
                }
            }
        }

        UPLOADS_COMPLETED_TOTAL.with_label_values(&["failed"]).inc();
        error!(
            customer_id,
            extraction_id,
            attempts = self.config.max_attempts,
            "Retry budget exhausted"
        );
        Err(last_error.unwrap_or_else(|| {
            PipelineError::StorageError("retry budget exhausted with no recorded error".to_string())
        }))
    }

    /// One upload attempt: load the snapshot, write all vertices, then all
    /// edges. Returns (nodes_written, edges_written)
    async fn upload_snapshot(
        &self,
        customer_id: &str,
        extraction_id: &str,
    ) -> Result<(usize, usize)> {
        let snapshot = self
            .with_timeout(
                "get_snapshot",
                self.store.get_snapshot(customer_id, extraction_id),
            )
            .await?;
        self.check_customer(customer_id, &snapshot.customer_id)?;

        let mut nodes_written = 0usize;
        for entity in &snapshot.nodes {
            self.with_timeout(
                "upsert_vertex",
                self.db.upsert_vertex(
                    &entity.id,
                    entity.entity_type.as_str(),
                    entity_properties(entity),
                ),
            )
            .await
            .map_err(|e| partial(nodes_written, 0, e))?;
            nodes_written += 1;
            VERTICES_UPSERTED_TOTAL.inc();
        }

        let mut edges_written = 0usize;
        for edge in &snapshot.edges {
            let mut props = relationship_properties(edge);
            props.insert("customer_id".to_string(), snapshot.customer_id.clone());
            props.insert("extraction_id".to_string(), snapshot.extraction_id.clone());

            self.with_timeout(
                "upsert_edge",
                self.db.upsert_edge(
                    &edge.id,
                    &edge.source_id,
                    &edge.target_id,
                    edge.relation_type.as_str(),
                    props,
                ),
            )
            .await
            .map_err(|e| partial(nodes_written, edges_written, e))?;
            edges_written += 1;
            EDGES_UPSERTED_TOTAL.inc();
        }

        Ok((nodes_written, edges_written))
    }

    fn check_customer(&self, expected: &str, found: &str) -> Result<()> {
        if expected != found {
            return Err(PipelineError::CrossCustomerViolation {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::UploadTimeout {
                operation: operation.to_string(),
                timeout_secs: self.config.operation_timeout.as_secs(),
            }),
        }
    }
}

/// Wrap a mid-upload error with the progress made so far, preserving fatal
/// classification: a cross-customer hit stays fatal even mid-write
fn partial(nodes_written: usize, edges_written: usize, err: PipelineError) -> PipelineError {
    if !err.is_retryable() {
        return err;
    }
    PipelineError::PartialUploadFailure {
        nodes_written,
        edges_written,
        cause: err.message(),
    }
}
