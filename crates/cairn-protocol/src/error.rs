use cairn_types::{Hash, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: String, remote: String },

    #[error("invalid hash: {0}")]
    InvalidHash(#[from] TypeError),

    #[error("chunk {expected} arrived with bytes hashing to {computed}")]
    HashMismatch { expected: Hash, computed: Hash },

    #[error("malformed form body: {0}")]
    MalformedForm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
