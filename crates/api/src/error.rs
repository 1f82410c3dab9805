//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Engine workflow error.
    Engine(EngineError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: EngineError) -> (StatusCode, String) {
    match &err {
        EngineError::InvalidRequest(_) | EngineError::InvalidEvent(_) | EngineError::Domain(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        EngineError::CapacityExceeded | EngineError::AlreadyDecided => {
            (StatusCode::CONFLICT, err.to_string())
        }
        EngineError::InvalidSignature => (StatusCode::UNAUTHORIZED, err.to_string()),
        EngineError::BookingNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        // Tell the client to retry without leaking gateway details.
        EngineError::GatewayUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "payment is temporarily unavailable, please retry".to_string(),
        ),
        EngineError::Store(inner) => {
            tracing::error!(error = %inner, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
