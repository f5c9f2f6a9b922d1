//! Upload ledger
//!
//! Append-only audit trail of upload state per (customer, extraction).
//! Every state transition appends a new sequenced record; nothing is ever
//! rewritten or deleted, so the full retry history stays reconstructable
//! and "what is the current state" is just the highest sequence number.
//!
//! RocksDB keys: `{customer_id}:{extraction_id}:{seq:020}` with
//! bincode-encoded records, so a prefix scan yields one extraction's
//! history in order.

use chrono::{DateTime, Utc};
use rocksdb::{Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::{PipelineError, Result};
use crate::metrics::LEDGER_OPS_TOTAL;

/// Upload state machine per extraction
///
/// PENDING -> IN_PROGRESS -> SUCCEEDED, or
/// PENDING -> IN_PROGRESS -> FAILED -> PENDING (retry)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// SUCCEEDED never transitions; FAILED is terminal only once the retry
    /// budget is exhausted, which the coordinator decides
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One ledger entry: the state of one extraction's upload at one moment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub customer_id: String,
    pub extraction_id: String,
    pub status: UploadStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub updated_at: DateTime<Utc>,
    /// Assigned by the ledger on append
    pub seq: u64,
}

impl UploadRecord {
    /// Fresh PENDING record for a newly discovered snapshot
    pub fn pending(customer_id: &str, extraction_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            extraction_id: extraction_id.to_string(),
            status: UploadStatus::Pending,
            attempt_count: 0,
            last_error: None,
            nodes_written: 0,
            edges_written: 0,
            updated_at: Utc::now(),
            seq: 0,
        }
    }
}

/// RocksDB-backed append-only ledger
pub struct UploadLedger {
    db: DB,
}

impl UploadLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .map_err(|e| PipelineError::StorageError(format!("ledger open failed: {e}")))?;
        Ok(Self { db })
    }

    fn key(customer_id: &str, extraction_id: &str, seq: u64) -> Vec<u8> {
        format!("{customer_id}:{extraction_id}:{seq:020}").into_bytes()
    }

    fn prefix(customer_id: &str, extraction_id: &str) -> Vec<u8> {
        format!("{customer_id}:{extraction_id}:").into_bytes()
    }

    /// Append a state transition. The record's `seq` and `updated_at` are
    /// assigned here; the caller-supplied values are ignored
    pub fn append(&self, record: &UploadRecord) -> Result<UploadRecord> {
        let next_seq = self
            .latest(&record.customer_id, &record.extraction_id)?
            .map(|r| r.seq + 1)
            .unwrap_or(0);

        let mut stamped = record.clone();
        stamped.seq = next_seq;
        stamped.updated_at = Utc::now();

        let bytes = bincode::serialize(&stamped)
            .map_err(|e| PipelineError::SerializationError(e.to_string()))?;
        let key = Self::key(&stamped.customer_id, &stamped.extraction_id, next_seq);
        self.db.put(key, bytes).map_err(|e| {
            LEDGER_OPS_TOTAL.with_label_values(&["append", "error"]).inc();
            PipelineError::StorageError(format!("ledger append failed: {e}"))
        })?;

        LEDGER_OPS_TOTAL.with_label_values(&["append", "ok"]).inc();
        Ok(stamped)
    }

    /// Current state of one extraction's upload, if any record exists
    pub fn latest(&self, customer_id: &str, extraction_id: &str) -> Result<Option<UploadRecord>> {
        Ok(self.history(customer_id, extraction_id)?.pop())
    }

    /// Full transition history for one extraction, oldest first
    pub fn history(&self, customer_id: &str, extraction_id: &str) -> Result<Vec<UploadRecord>> {
        let prefix = Self::prefix(customer_id, extraction_id);
        let mut records = Vec::new();

        let iter = self.db.prefix_iterator(&prefix);
        for item in iter {
            let (key, value) =
                item.map_err(|e| PipelineError::StorageError(format!("ledger scan failed: {e}")))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: UploadRecord = bincode::deserialize(&value)
                .map_err(|e| PipelineError::SerializationError(e.to_string()))?;
            records.push(record);
        }

        LEDGER_OPS_TOTAL.with_label_values(&["scan", "ok"]).inc();
        Ok(records)
    }

    /// Latest record per extraction for one customer
    pub fn latest_for_customer(&self, customer_id: &str) -> Result<HashMap<String, UploadRecord>> {
        let prefix = format!("{customer_id}:").into_bytes();
        let mut latest: HashMap<String, UploadRecord> = HashMap::new();

        let iter = self.db.prefix_iterator(&prefix);
        for item in iter {
            let (key, value) =
                item.map_err(|e| PipelineError::StorageError(format!("ledger scan failed: {e}")))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: UploadRecord = bincode::deserialize(&value)
                .map_err(|e| PipelineError::SerializationError(e.to_string()))?;
            // Keys sort by seq within an extraction, so later entries win
            latest.insert(record.extraction_id.clone(), record);
        }

        LEDGER_OPS_TOTAL.with_label_values(&["scan", "ok"]).inc();
        Ok(latest)
    }
}
