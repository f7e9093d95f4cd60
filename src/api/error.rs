//! Mapping of ingestion errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::detect::DetectError;
use crate::incident::StoreError;
use crate::ingest::IngestError;

/// Error returned by every handler. Body is `{"detail": "<message>"}`.
#[derive(Debug)]
pub struct ApiError(pub IngestError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(IngestError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            IngestError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Detect(DetectError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            IngestError::Detect(DetectError::Failed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Detect(DetectError::Transport(_)) => StatusCode::BAD_GATEWAY,
            IngestError::Detect(DetectError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err.into())
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self.0 {
            IngestError::Store(StoreError::NotFound(_)) => "Incident not found".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
