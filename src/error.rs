// In: src/error.rs

//! This module defines the single, unified error type for the entire timeline library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::MetricId;

#[derive(Error, Debug)]
pub enum TimelineError {
    // =========================================================================
    // === Codec Errors (Specific to the sample stream format)
    // =========================================================================
    #[error("Corrupt sample stream at byte {offset}: {reason}")]
    CorruptStream { offset: usize, reason: String },

    #[error(
        "Sample {index} is not strictly after its predecessor: {current} <= {previous}"
    )]
    NonMonotonicInput {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Value cannot be represented exactly: {0}")]
    PrecisionLoss(String),

    #[error("Unsupported stream format version: {0}")]
    UnsupportedFormatVersion(u8),

    #[error("Write-time verification failed: {0}")]
    VerificationFailed(String),

    // =========================================================================
    // === Dictionary & Persistence Errors
    // =========================================================================
    #[error("Unknown metric id: {0}")]
    UnknownMetric(MetricId),

    #[error("Metric dictionary conflict: {0}")]
    DictionaryConflict(String),

    #[error("Storage operation failed: {0}")]
    Store(String),

    /// A time range whose start is not strictly before its end.
    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    // =========================================================================
    // === Configuration & External Error Wrappers
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error originating from the underlying I/O subsystem (e.g., a config or log file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading configuration.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl TimelineError {
    /// Shorthand used throughout the decoder.
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        TimelineError::CorruptStream {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the bytes themselves rather than by the caller
    /// or the storage backend. Retrying these can never succeed.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            TimelineError::CorruptStream { .. } | TimelineError::UnsupportedFormatVersion(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TimelineError>;

// =============================================================================
// === Persistence Collaborator Errors ===
// =============================================================================

/// Errors reported by a `MetricStore` or `BlobStore` implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (e.g. two writers inserting the
    /// same metric name at once).
    #[error("uniqueness conflict: {0}")]
    Conflict(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for TimelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => TimelineError::DictionaryConflict(msg),
            StoreError::Backend(msg) => TimelineError::Store(msg),
        }
    }
}
