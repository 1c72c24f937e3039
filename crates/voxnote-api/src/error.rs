// =============================================================================
// ERROR HANDLING
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error returned by handlers, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Core(voxnote_core::Error),
    BadRequest(String),
    ServiceUnavailable(String),
}

impl From<voxnote_core::Error> for ApiError {
    fn from(err: voxnote_core::Error) -> Self {
        ApiError::Core(err)
    }
}

/// Status code for a core error.
pub fn status_for(err: &voxnote_core::Error) -> StatusCode {
    use voxnote_core::Error;
    match err {
        Error::NotFound(_) | Error::CategoryNotFound(_) | Error::EntryNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NoSpeech => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        e if e.is_duplicate() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Core(err) => {
                let status = status_for(&err);
                let message = match &err {
                    // Raw unique violations carry SQL detail; clients only need the kind.
                    voxnote_core::Error::Database(_) if status == StatusCode::CONFLICT => {
                        "Conflict: record already exists".to_string()
                    }
                    _ => err.to_string(),
                };
                if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
                    error!(
                        subsystem = "api",
                        error = %err,
                        "Request failed"
                    );
                }
                (status, message)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("Invalid input: {}", msg)),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
