//! Expiration sweep trigger
//!
//! GET /cron/expire-tracks, called by an external cron with the shared secret.

use axum::{extract::State, routing::get, Json, Router};

use crate::{
    api::InternalAuth,
    error::{ApiError, ApiResult},
    services::{SweepOutcome, SweepSummary, SweepTrigger},
    AppState,
};
use trackshare_common::time;

/// GET /cron/expire-tracks
///
/// 200 with the run summary, 409 when another sweep holds the lease.
pub async fn expire_tracks(
    _auth: InternalAuth,
    State(state): State<AppState>,
) -> ApiResult<Json<SweepSummary>> {
    match state.sweeper.run(SweepTrigger::Http, time::now()).await? {
        SweepOutcome::Completed(summary) => Ok(Json(summary)),
        SweepOutcome::Skipped => Err(ApiError::Conflict(
            "Expiration sweep already running".to_string(),
        )),
    }
}

pub fn sweep_routes() -> Router<AppState> {
    Router::new().route("/cron/expire-tracks", get(expire_tracks))
}
