use cairn_chunks::StoreError;
use cairn_types::{Hash, Type, TypeError};

/// A write or incoming chunk would break the chunk graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// `parent` references `target`, which was never written or read
    /// through this store and is not in the backing store.
    #[error("{parent} references missing chunk {target}")]
    MissingChunk { parent: Hash, target: Hash },

    /// A ref declares a type that differs from the stored value's type.
    #[error("ref to {target} declares {declared} but the chunk holds {recorded}")]
    TypeMismatch {
        target: Hash,
        declared: Type,
        recorded: Type,
    },

    /// Chunk bytes do not hash to the claimed hash.
    #[error("chunk claims hash {expected} but hashes to {computed}")]
    HashMismatch { expected: Hash, computed: Hash },
}

/// Errors from value store operations.
#[derive(Debug, thiserror::Error)]
pub enum ValuesError {
    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for value store operations.
pub type ValuesResult<T> = Result<T, ValuesError>;
