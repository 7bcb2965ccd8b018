//! trackshare-engine library interface
//!
//! Membership and track-lifecycle reconciliation: billing webhooks keep account
//! tiers in line with the billing provider, and the expiration sweep archives
//! tracks past their owner's retention window.

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use trackshare_common::config::EngineConfig;

use crate::services::{
    ArchivalExecutor, BillingProvider, CustomerResolver, EventVerifier, ExpirationScanner,
    NotificationDispatcher, Notifier, ObjectStore, RetentionPolicy, SweepRunner, SweepSettings,
    WebhookProcessor,
};

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub billing: Arc<dyn BillingProvider>,
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub webhooks: Arc<WebhookProcessor>,
    pub customers: Arc<CustomerResolver>,
    pub sweeper: Arc<SweepRunner>,
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Bearer secret for the cron trigger and internal routes
    pub cron_secret: Arc<str>,
    /// Cancelled on shutdown; in-flight sweeps stop at the next batch boundary
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: &EngineConfig,
        collaborators: Collaborators,
    ) -> trackshare_common::Result<Self> {
        let shutdown = CancellationToken::new();

        let verifier = EventVerifier::new(
            config.billing.webhook_secret.clone(),
            config.billing.signature_tolerance_secs,
        );
        let webhooks = WebhookProcessor::new(db.clone(), verifier, Arc::clone(&collaborators.billing));
        let customers = CustomerResolver::new(db.clone(), Arc::clone(&collaborators.billing));

        let policy = RetentionPolicy::from_config(&config.retention)?;
        let scanner = ExpirationScanner::new(db.clone(), policy);
        let archiver = ArchivalExecutor::new(
            db.clone(),
            Arc::clone(&collaborators.store),
            config.storage.bucket_url_prefix(),
        );
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&collaborators.notifier)));
        let lease_ttl_secs = i64::try_from(config.sweep.lease_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        let sweeper = SweepRunner::new(
            db.clone(),
            scanner,
            archiver,
            Arc::clone(&dispatcher),
            SweepSettings {
                batch_size: config.sweep.batch_size,
                lease_ttl: chrono::Duration::seconds(lease_ttl_secs),
            },
            shutdown.clone(),
        );

        Ok(Self {
            db,
            webhooks: Arc::new(webhooks),
            customers: Arc::new(customers),
            sweeper: Arc::new(sweeper),
            dispatcher,
            cron_secret: Arc::from(config.sweep.cron_secret.as_str()),
            shutdown,
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::sweep_routes())
        .merge(api::internal_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
