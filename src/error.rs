use std::path::PathBuf;

use thiserror::Error;

/// Main error type for lucerna operations
#[derive(Error, Debug)]
pub enum LucernaError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Non-monotonic doc id: {doc} does not follow {previous}")]
    NonMonotonicDocId { previous: u32, doc: u32 },

    #[error("Out-of-order term: {term} does not follow {previous}")]
    OutOfOrderTerm { previous: String, term: String },

    #[error("Document not found: {0}")]
    DocNotFound(u32),

    #[error("Scorer is not positioned on a document")]
    NotPositioned,

    #[error("Corrupt index data: {0}")]
    Corrupt(String),

    #[error("Merge aborted")]
    MergeAborted,

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Unknown postings format: {0}")]
    UnknownCodec(String),

    #[error("No index found in {0}")]
    IndexNotFound(PathBuf),

    #[error("Write lock already held: {0}")]
    LockHeld(PathBuf),

    #[error("Index writer is closed")]
    AlreadyClosed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for lucerna operations
pub type Result<T> = std::result::Result<T, LucernaError>;

impl LucernaError {
    /// Check if this error indicates a failure that can be retried.
    ///
    /// Flush, merge and commit publish nothing on failure, so I/O errors and
    /// aborted merges leave the index exactly as it was before the call.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LucernaError::Io(_) | LucernaError::MergeAborted | LucernaError::MergeFailed(_)
        )
    }

    /// Check if this error signals a caller contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LucernaError::NonMonotonicDocId { .. }
                | LucernaError::OutOfOrderTerm { .. }
                | LucernaError::NotPositioned
                | LucernaError::InvalidArgument(_)
        )
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        LucernaError::Decode(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        LucernaError::Encode(msg.into())
    }
}
