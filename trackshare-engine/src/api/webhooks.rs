//! Billing webhook endpoint
//!
//! POST /webhooks/billing. The raw body is taken as bytes: the signature covers
//! the exact bytes sent, so it must not be parsed before verification.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::{
    error::ApiResult,
    services::{WebhookError, SIGNATURE_HEADER},
    AppState,
};

/// POST /webhooks/billing response
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub duplicate: bool,
    pub action: &'static str,
}

/// POST /webhooks/billing
pub async fn receive_billing_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .webhooks
        .process(&body, signature)
        .await
        .map_err(|e| {
            if let WebhookError::Verification(ref reason) = e {
                warn!(reason = %reason, "Rejected billing webhook");
            }
            e
        })?;

    Ok(Json(WebhookResponse {
        received: true,
        duplicate: outcome.duplicate,
        action: outcome.action,
    }))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/billing", post(receive_billing_event))
}
