//! API error types with HTTP response mapping.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CommerceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by a commerce service.
    Commerce(CommerceError),
    /// Malformed request: unparseable id or body.
    BadRequest(String),
}

impl ApiError {
    /// Status code and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Commerce(err) => match err {
                CommerceError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
                CommerceError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                CommerceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                CommerceError::EmptyCart => (StatusCode::BAD_REQUEST, "EMPTY_CART"),
                CommerceError::AlreadyReviewed { .. } => (StatusCode::CONFLICT, "ALREADY_REVIEWED"),
                CommerceError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                CommerceError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                CommerceError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            ApiError::Commerce(CommerceError::StoreUnavailable(err)) => {
                tracing::error!(error = %err, "document store unavailable");
                "Document store unavailable".to_string()
            }
            ApiError::Commerce(err) => err.to_string(),
            ApiError::BadRequest(msg) => msg,
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError::Commerce(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Parses a path or body identifier, rejecting malformed values with 400.
pub fn parse_id<T>(what: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id {raw:?}: {e}")))
}
