//! Response shaping and error mapping.
//!
//! # Responsibilities
//! - Map handler failures to HTTP status codes and JSON bodies
//! - Keep lookup failures generic so callers cannot tell which check failed
//! - Log internal failures without exposing them
//!
//! # Design Decisions
//! - Every error body is `{"error": "<localized message>"}`
//! - Rate limiting adds `retryAfter` to the body and a `Retry-After` header
//! - Backend errors become 500 with a fixed message; the cause goes to the log only

use std::borrow::Cow;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;

/// Generic message for unexpected failures.
pub const INTERNAL_ERROR: &str = "Error interno del servidor";

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(Cow<'static, str>),

    /// Credentials or token rejected.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Nothing to return for this lookup.
    #[error("{0}")]
    NotFound(&'static str),

    /// Too many attempts from this client.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A platform call failed. `message` is what the caller sees.
    #[error("{message}: {source}")]
    Backend {
        message: &'static str,
        #[source]
        source: BackendError,
    },

    /// Any other unexpected failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap a backend error with the message shown to the caller.
    pub fn backend(message: &'static str) -> impl FnOnce(BackendError) -> ApiError {
        move |source| ApiError::Backend { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Backend { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(msg) => (status, Json(json!({ "error": msg }))).into_response(),
            ApiError::Unauthorized(msg) | ApiError::NotFound(msg) => {
                (status, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::RateLimited { retry_after_secs } => {
                let mut response = (
                    status,
                    Json(json!({
                        "error": "Demasiados intentos. Intenta nuevamente más tarde.",
                        "retryAfter": retry_after_secs,
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            ApiError::Backend { message, source } => {
                tracing::error!(error = %source, "{}", message);
                (status, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Unexpected failure");
                (status, Json(json!({ "error": INTERNAL_ERROR }))).into_response()
            }
        }
    }
}
