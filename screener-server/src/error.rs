use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use screener_runner::PipelineError;
use serde_json::json;

/// Unified error type for API responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// A pipeline run is already in progress.
    Busy(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad_request: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Internal(msg) => write!(f, "internal_error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Busy(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => {
                tracing::error!("request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = json!({ "status": "error", "message": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        if matches!(e, PipelineError::Busy(_)) {
            Self::Busy(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("pipeline task failed: {e}"))
    }
}
