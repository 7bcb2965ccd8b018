//! Shared-secret guard for the cron trigger and internal routes
//!
//! Implemented as an extractor: handlers that take [`InternalAuth`] reject the
//! request with 403 before running.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{error::ApiError, AppState};

/// Proof that the request carried `Authorization: Bearer <cron secret>`
#[derive(Debug, Clone, Copy)]
pub struct InternalAuth;

#[async_trait]
impl FromRequestParts<AppState> for InternalAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if secrets_match(token, &state.cron_secret) => Ok(InternalAuth),
            Some(_) => {
                warn!(path = %parts.uri.path(), "Rejected request with wrong shared secret");
                Err(ApiError::Forbidden)
            }
            None => {
                warn!(path = %parts.uri.path(), "Rejected request without bearer secret");
                Err(ApiError::Forbidden)
            }
        }
    }
}

/// Compare via digests so timing does not depend on where the inputs differ
fn secrets_match(provided: &str, expected: &str) -> bool {
    !expected.is_empty()
        && Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}
