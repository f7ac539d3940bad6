use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use brushlink_comfyui::runner::GenerationError;
use brushlink_core::error::CoreError;

/// Application-level error type for the HTTP routes.
///
/// Implements [`IntoResponse`] to produce consistent `{error, code}` JSON
/// bodies. WebSocket sessions do not use this -- their failures become
/// status frames on the channel instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A plugin-data file could not be read or parsed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The generation run failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Core(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PLUGIN_DATA_ERROR",
                e.to_string(),
            ),
            AppError::Generation(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_FAILED",
                e.to_string(),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
