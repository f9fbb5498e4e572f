use advex_core::error::CoreError;
use advex_core::orchestrator::SubmissionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            AppError::Submission(err) => match err {
                SubmissionError::Capacity => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVER_BUSY", err.to_string())
                }
                SubmissionError::ImageLoad(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "IMAGE_LOAD", err.to_string())
                }
                SubmissionError::ImageProcess(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "IMAGE_PROCESS",
                    err.to_string(),
                ),
                SubmissionError::Scheduling(msg) => {
                    tracing::error!(error = %msg, "Scheduling failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "SCHEDULING",
                        "The task could not be scheduled".to_string(),
                    )
                }
                SubmissionError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
