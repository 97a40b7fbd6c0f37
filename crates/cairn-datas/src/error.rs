//! Error types for database operations.

use cairn_chunks::StoreError;
use cairn_types::Hash;
use cairn_values::{IntegrityError, ValuesError};
use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatasError {
    /// The new head is not the current head and does not descend from it.
    #[error("merge needed: commit to {dataset} is not a fast-forward")]
    MergeNeeded { dataset: String },

    /// Another writer moved the root first. Re-read and retry.
    #[error("optimistic lock failed: root moved while committing to {dataset}")]
    OptimisticLockFailed { dataset: String },

    /// The dataset has no head.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// The dataset id is not well formed.
    #[error("invalid dataset id {id:?}: {reason}")]
    InvalidDatasetId { id: String, reason: String },

    /// The chunk exists but does not hold a commit.
    #[error("not a commit: {0}")]
    NotACommit(Hash),

    /// A commit named as a head or parent is missing.
    #[error("commit not found: {0}")]
    CommitNotFound(Hash),

    /// The root does not hold a dataset map.
    #[error("root {0} does not hold a dataset map")]
    CorruptRoot(Hash),

    #[error(transparent)]
    Values(#[from] ValuesError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IntegrityError> for DatasError {
    fn from(e: IntegrityError) -> Self {
        Self::Values(e.into())
    }
}

/// Convenience type alias for database operations.
pub type DatasResult<T> = std::result::Result<T, DatasError>;
