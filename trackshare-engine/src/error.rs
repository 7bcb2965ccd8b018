//! Error types for trackshare-engine
//!
//! Each service error maps onto one HTTP status. The billing provider redelivers
//! on any non-2xx, so retryable failures must never answer 2xx.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{CustomerError, SweepError, VerificationError, WebhookError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Webhook verification failure (400)
    #[error("Webhook verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// Missing or wrong shared secret (403)
    #[error("Forbidden")]
    Forbidden,

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict (409) - e.g., sweep already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Event cannot be attributed to an account (422)
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Retryable storage failure (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Upstream provider failure (502)
    #[error("Upstream failure: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// trackshare-common error
    #[error("Common error: {0}")]
    Common(#[from] trackshare_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Verification(ref err) => (
                StatusCode::BAD_REQUEST,
                "VERIFICATION_FAILED",
                err.to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Forbidden".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNRESOLVABLE_METADATA",
                msg,
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg,
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Verification(e) => ApiError::Verification(e),
            WebhookError::UnresolvableMetadata(msg) => ApiError::Unprocessable(msg),
            WebhookError::Provider(e) => ApiError::BadGateway(e.to_string()),
            WebhookError::LedgerWrite(e) => ApiError::ServiceUnavailable(e.to_string()),
        }
    }
}

impl From<CustomerError> for ApiError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::AccountNotFound(id) => {
                ApiError::NotFound(format!("Account not found: {}", id))
            }
            CustomerError::Provider(e) => ApiError::BadGateway(e.to_string()),
            CustomerError::Database(e) => ApiError::Common(e),
        }
    }
}

impl From<SweepError> for ApiError {
    fn from(err: SweepError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
