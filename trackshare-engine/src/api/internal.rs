//! Internal operator endpoints (shared-secret protected)
//!
//! GET /internal/storage-orphans, POST /internal/accounts/:account_id/billing-customer

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::InternalAuth,
    db::orphans::{self, StorageOrphan},
    error::ApiResult,
    AppState,
};

const DEFAULT_ORPHAN_LIMIT: i64 = 100;
const MAX_ORPHAN_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct OrphanQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrphanListResponse {
    pub count: usize,
    pub orphans: Vec<StorageOrphan>,
}

#[derive(Debug, Serialize)]
pub struct BillingCustomerResponse {
    pub account_id: String,
    pub billing_customer_id: String,
}

/// GET /internal/storage-orphans
pub async fn list_storage_orphans(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Query(query): Query<OrphanQuery>,
) -> ApiResult<Json<OrphanListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ORPHAN_LIMIT)
        .clamp(1, MAX_ORPHAN_LIMIT);
    let orphans = orphans::list(&state.db, limit).await?;

    Ok(Json(OrphanListResponse {
        count: orphans.len(),
        orphans,
    }))
}

/// POST /internal/accounts/:account_id/billing-customer
///
/// Idempotent: returns the existing customer when one is already linked.
pub async fn resolve_billing_customer(
    _auth: InternalAuth,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> ApiResult<Json<BillingCustomerResponse>> {
    let billing_customer_id = state.customers.resolve_customer_id(&account_id).await?;

    Ok(Json(BillingCustomerResponse {
        account_id,
        billing_customer_id,
    }))
}

pub fn internal_routes() -> Router<AppState> {
    Router::new()
        .route("/internal/storage-orphans", get(list_storage_orphans))
        .route(
            "/internal/accounts/:account_id/billing-customer",
            post(resolve_billing_customer),
        )
}
