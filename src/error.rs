//! Error types for s3shuttle
//!
//! This module defines all error types used throughout the crate. Transient
//! handling lives in the retry driver; everything surfaced to callers is one
//! of the variants below.

use thiserror::Error;

use crate::range::{ContentRange, PartRange};

/// Main error type for transfer operations
#[derive(Error, Debug)]
pub enum TransferError {
    /// A remote S3 call failed. The source is the transport/SDK error as
    /// reported by the `S3Api` implementation; the classifier decides
    /// whether it is retryable.
    #[error("S3 {operation} failed: {source}")]
    Api {
        /// Name of the failed API operation
        operation: &'static str,
        /// Underlying transport or service error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error on the local side of a transfer (reading an upload body,
    /// seeking a part reader, writing a downloaded part). These are fatal:
    /// the remote end is fine, the local input or sink is not.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Range header could not be parsed or formatted
    #[error(transparent)]
    Range(#[from] RangeError),

    /// The server accepted `CreateMultipartUpload` but returned no upload ID
    #[error("no upload ID in CreateMultipartUpload response")]
    MissingUploadId,

    /// A ranged `GetObject` response carried no Content-Range header
    #[error("no Content-Range in ranged GetObject response")]
    MissingContentRange,

    /// The server answered a ranged request with a range that does not start
    /// where the request asked. Treated as a server quirk and retried.
    #[error("requested range {requested}, server returned {returned}")]
    UnexpectedServerResponse {
        /// Range the engine requested
        requested: PartRange,
        /// Range the server claims to have returned
        returned: ContentRange,
    },

    /// The object's ETag changed between ranged requests of one download
    #[error("object changed during download: initial ETag {initial:?}, current ETag {current:?}")]
    ChangedDuringDownload {
        /// ETag recorded from the first response
        initial: Option<String>,
        /// ETag seen on the mismatching response
        current: Option<String>,
    },

    /// The sliced input would produce more parts than the configured limit
    #[error("input exceeds the maximum of {limit} upload parts")]
    TooManyParts {
        /// Configured part count limit
        limit: usize,
    },

    /// The in-flight remote call was cancelled by a forced pause. Internal
    /// sentinel: the retry driver treats it as retryable so the transfer
    /// loop re-enters the pause barrier instead of failing.
    #[error("force paused")]
    ForcePaused,

    /// The transfer was cancelled by the caller
    #[error("transfer cancelled")]
    Cancelled,

    /// The retry budget for one attempt series ran out
    #[error("retry exceeded limit: {source}")]
    RetryExhausted {
        /// The last error the failed attempt produced
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// Create an API error for the named operation
    pub fn api(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Api {
            operation,
            source: source.into(),
        }
    }

    /// Check whether this error (or its retry-exhausted cause) is the
    /// caller's cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetryExhausted { source } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Strip a retry-exhausted wrapper, yielding the underlying cause
    pub fn root(&self) -> &TransferError {
        match self {
            Self::RetryExhausted { source } => source.root(),
            other => other,
        }
    }
}

/// Errors from parsing or validating byte-range headers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// The header does not split into the expected number of pieces
    #[error("invalid range header format")]
    InvalidFormat,

    /// The range unit is not one this crate understands
    #[error("invalid range unit: {0}")]
    InvalidUnit(String),

    /// Start, end, or size is not an integer, or `*` appeared where it is
    /// not allowed
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;
