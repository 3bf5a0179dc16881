//! Maps queue errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use taskbelt_core::QueueError;

pub fn error_response(err: QueueError) -> axum::response::Response {
    match err {
        QueueError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        QueueError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        e @ QueueError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        e => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
