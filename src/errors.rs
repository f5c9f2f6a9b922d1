//! Structured error types for the extraction and upload pipeline
//! Separates fatal extraction errors from retryable upload errors so callers
//! can tell "nothing was written" apart from "partially written, retry safe"

use std::fmt;

/// Application error types with proper categorization
#[derive(Debug)]
pub enum PipelineError {
    // Extraction-time fatal errors (nothing is written)
    /// No PERSON entity could be derived; the rest of the pipeline has no
    /// subject to anchor relationships on
    MissingPrimarySubject {
        customer_id: String,
        extraction_id: String,
    },
    /// Assembly produced zero entities
    EmptyGraph {
        customer_id: String,
        extraction_id: String,
    },
    /// Input validation failed before any side effect
    InvalidInput { field: String, reason: String },

    // Upload-time errors
    /// An upload record or snapshot belongs to a different customer than the
    /// batch being processed. Indicates a caller/config bug; aborts the batch
    CrossCustomerViolation { expected: String, found: String },
    /// A store or graph-database call exceeded the operation timeout
    UploadTimeout { operation: String, timeout_secs: u64 },
    /// Edge writing failed after some vertices succeeded; progress counts are
    /// recorded in the upload ledger and a retry is safe (upserts are
    /// idempotent)
    PartialUploadFailure {
        nodes_written: usize,
        edges_written: usize,
        cause: String,
    },

    // Infrastructure errors
    StorageError(String),
    SerializationError(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl PipelineError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPrimarySubject { .. } => "MISSING_PRIMARY_SUBJECT",
            Self::EmptyGraph { .. } => "EMPTY_GRAPH",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::CrossCustomerViolation { .. } => "CROSS_CUSTOMER_VIOLATION",
            Self::UploadTimeout { .. } => "UPLOAD_TIMEOUT",
            Self::PartialUploadFailure { .. } => "PARTIAL_UPLOAD_FAILURE",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the coordinator's retry/backoff policy may absorb this error.
    /// Fatal errors abort immediately and surface to the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UploadTimeout { .. }
                | Self::PartialUploadFailure { .. }
                | Self::StorageError(_)
        )
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::MissingPrimarySubject {
                customer_id,
                extraction_id,
            } => format!(
                "No primary subject entity could be derived (customer={customer_id}, extraction={extraction_id})"
            ),
            Self::EmptyGraph {
                customer_id,
                extraction_id,
            } => format!(
                "Assembly produced an empty graph (customer={customer_id}, extraction={extraction_id})"
            ),
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::CrossCustomerViolation { expected, found } => format!(
                "Cross-customer violation: processing customer '{expected}' but found record for '{found}'"
            ),
            Self::UploadTimeout {
                operation,
                timeout_secs,
            } => format!("Operation '{operation}' timed out after {timeout_secs}s"),
            Self::PartialUploadFailure {
                nodes_written,
                edges_written,
                cause,
            } => format!(
                "Upload failed after writing {nodes_written} vertices and {edges_written} edges: {cause}"
            ),
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::SerializationError(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

/// Type alias for Results using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
