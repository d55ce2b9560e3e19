use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Errors surfaced to the publisher by the ingest endpoints
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// PUT/POST arrived without a body
    #[error("request body is empty")]
    MissingBody,

    /// Upload path is empty, absolute, or escapes the channel directory
    #[error("invalid upload path: {0}")]
    InvalidPath(String),

    /// Backing write failed; the tracking engine was not updated
    #[error("failed to store {path}: {source}")]
    StorageWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingBody | IngestError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            IngestError::StorageWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            })),
        )
            .into_response()
    }
}
