//! Error types for pipeline operations.
//!
//! A quality-gate expectation mismatch is a determinate, reportable outcome
//! and gets its own variant, distinct from infrastructure failures
//! (`Storage`, `Query`), so orchestrators can halt-and-alert on the former
//! and retry the latter.

use thiserror::Error;

use crate::quality::CheckValue;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur during pipeline steps.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A raw payload failed schema validation; the whole batch is rejected.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the schema failure.
        message: String,
    },

    /// A sink or raw-input storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// Arrow/parquet encoding or decoding failed.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    /// A quality-gate query could not be executed.
    #[error("query error: {message}")]
    Query {
        /// Description of the query failure.
        message: String,
    },

    /// A quality check was rejected at construction time.
    #[error("invalid quality check: {message}")]
    InvalidCheck {
        /// Description of what made the check invalid.
        message: String,
    },

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A quality check observed a value other than the expected one.
    ///
    /// This is the gate's determinate failure mode: the pipeline run must
    /// not be treated as successful, and remaining checks are skipped.
    #[error("quality check failed for `{query}`: expected {expected}, observed {observed}")]
    ExpectationMismatch {
        /// The query text of the failing check.
        query: String,
        /// The expected scalar.
        expected: CheckValue,
        /// The observed scalar.
        observed: CheckValue,
    },
}

impl From<cadenza_core::Error> for PipelineError {
    fn from(err: cadenza_core::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}
