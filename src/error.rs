//! Error types for the deduplication pipeline and its storage backends.

use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by [`RedundancyDetector::submit`](crate::detector::RedundancyDetector::submit).
///
/// Neither variant leaves the detector in a partial state: the index and
/// statistics look exactly as if the failed call had never been made.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The input is not a JSON object, or a value could not be rendered as text.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The store refused or failed to persist a new entry.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

/// Errors reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry {0} not found")]
    NotFound(Uuid),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be turned back into an entry.
    #[error("corrupt entry: {0}")]
    Corrupt(String),

    /// The backend cannot currently accept requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, DedupError>;
