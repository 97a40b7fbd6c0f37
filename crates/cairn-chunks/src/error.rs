use cairn_types::Hash;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk was not found.
    #[error("chunk not found: {0}")]
    NotFound(Hash),

    /// Chunk bytes do not hash to the hash they were stored under.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Hash, computed: Hash },

    /// The store could not durably accept these chunks yet; they must be
    /// resubmitted.
    #[error("backpressure on {} chunk(s)", .0.len())]
    Backpressure(Vec<Hash>),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The operation was cancelled before it completed. Any writes it
    /// carried are not durable.
    #[error("operation cancelled")]
    Cancelled,

    /// Failure in a remote store's transport.
    #[error("remote store error: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
