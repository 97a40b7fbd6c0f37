use cairn_chunks::StoreError;
use cairn_datas::DatasError;
use cairn_types::{Hash, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A chunk reachable from the walk root is not in the source.
    #[error("chunk {0} is reachable but missing from the source")]
    MissingChunk(Hash),

    #[error("walk failed: {0}")]
    Walk(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("decode error: {0}")]
    Type(#[from] TypeError),

    #[error("database error: {0}")]
    Datas(#[from] DatasError),

    #[error("staging file error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
