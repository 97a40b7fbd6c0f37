//! Client error types.

use cairn_chunks::StoreError;
use cairn_protocol::ProtocolError;

/// Errors from calls to a Cairn server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The server answered with a status the call does not expect.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("protocol version mismatch: client speaks {local}, server speaks {remote:?}")]
    VersionMismatch { local: String, remote: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server kept refusing part of a write batch.
    #[error("server still pushing back on {remaining} chunk(s) after all retries")]
    BackpressureExhausted { remaining: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("client is closed")]
    Closed,
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for StoreError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Cancelled => StoreError::Cancelled,
            ClientError::Closed => StoreError::Closed,
            other => StoreError::Remote(Box::new(other)),
        }
    }
}
