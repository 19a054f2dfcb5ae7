use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use mosaic_transfer::{ChunkProgress, TransferError};
use mosaic_types::api::ErrorResponse;

/// HTTP-facing error: a core error plus, for chunk submissions, the
/// session's progress so the sender can decide whether to retry.
#[derive(Debug)]
pub struct ApiError {
    pub error: TransferError,
    pub progress: Option<ChunkProgress>,
}

impl ApiError {
    pub fn with_progress(mut self, progress: Option<ChunkProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error {
            TransferError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TransferError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
            TransferError::HashMismatch { .. } => StatusCode::BAD_REQUEST,
            TransferError::NotFound(_) => StatusCode::NOT_FOUND,
            TransferError::AlreadyExists(_) => StatusCode::CONFLICT,
            TransferError::InvalidState { .. } => StatusCode::CONFLICT,
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(error: TransferError) -> Self {
        Self {
            error,
            progress: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.error.to_string(),
            code: self.error.code(),
            retriable: self.error.is_retriable(),
            progress: self.progress,
        };
        (status, Json(body)).into_response()
    }
}
