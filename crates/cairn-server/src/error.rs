use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cairn_chunks::StoreError;
use cairn_protocol::ProtocolError;
use cairn_sync::SyncError;
use cairn_values::ValuesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("value error: {0}")]
    Values(#[from] ValuesError),

    #[error("walk error: {0}")]
    Sync(#[from] SyncError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Values(ValuesError::Integrity(_)) | Self::Values(ValuesError::Type(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Sync(SyncError::MissingChunk(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
            self.to_string()
        };
        (status, message).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
