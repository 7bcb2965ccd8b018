//! Inbound billing webhook pipeline
//!
//! verify → ledger fast path → plan (provider I/O) → one transaction holding
//! the ledger insert and the membership update.

use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use trackshare_common::time;

use super::billing_client::{BillingProvider, ProviderError};
use super::event_verifier::{EventVerifier, VerificationError};
use super::subscription_reconciler::{ReconcileError, SubscriptionReconciler};
use crate::db::ledger;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Rolled back; the sender must redeliver once the metadata resolves
    #[error("{0}")]
    UnresolvableMetadata(String),

    #[error(transparent)]
    Provider(ProviderError),

    /// Ledger or membership write failed; retryable
    #[error("Ledger write failed: {0}")]
    LedgerWrite(trackshare_common::Error),
}

impl From<ReconcileError> for WebhookError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnresolvableMetadata(msg) => Self::UnresolvableMetadata(msg),
            ReconcileError::MalformedObject(msg) => {
                Self::Verification(VerificationError::MalformedEvent(msg))
            }
            ReconcileError::Provider(e) => Self::Provider(e),
            ReconcileError::Database(e) => Self::LedgerWrite(e),
        }
    }
}

impl From<sqlx::Error> for WebhookError {
    fn from(err: sqlx::Error) -> Self {
        Self::LedgerWrite(err.into())
    }
}

/// Result of handling one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub event_id: String,
    pub duplicate: bool,
    pub action: &'static str,
}

pub struct WebhookProcessor {
    db: SqlitePool,
    verifier: EventVerifier,
    reconciler: SubscriptionReconciler,
}

impl WebhookProcessor {
    pub fn new(db: SqlitePool, verifier: EventVerifier, billing: Arc<dyn BillingProvider>) -> Self {
        Self {
            db,
            verifier,
            reconciler: SubscriptionReconciler::new(billing),
        }
    }

    pub async fn process(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let now = time::now();
        let event = self.verifier.verify(body, signature, now)?;

        if ledger::is_processed(&self.db, &event.id)
            .await
            .map_err(WebhookError::LedgerWrite)?
        {
            info!(event_id = %event.id, kind = %event.kind, "Duplicate webhook delivery");
            return Ok(duplicate(event.id));
        }

        let change = self.reconciler.plan(&event).await.map_err(|e| {
            log_failure(&event.id, &e);
            WebhookError::from(e)
        })?;

        let mut tx = self.db.begin().await?;

        let is_new = ledger::record_if_new(
            &mut *tx,
            &event.id,
            event.kind.as_str(),
            &event.raw,
            now,
        )
        .await
        .map_err(WebhookError::LedgerWrite)?;
        if !is_new {
            // A concurrent delivery of the same event committed first
            tx.rollback().await?;
            info!(event_id = %event.id, "Duplicate webhook delivery (concurrent)");
            return Ok(duplicate(event.id));
        }

        if let Err(e) = SubscriptionReconciler::apply(&mut tx, &change, now).await {
            log_failure(&event.id, &e);
            tx.rollback().await?;
            return Err(e.into());
        }

        tx.commit().await?;

        info!(
            event_id = %event.id,
            kind = %event.kind,
            created = ?event.created,
            action = change.action(),
            "Billing event applied"
        );
        Ok(WebhookOutcome {
            event_id: event.id,
            duplicate: false,
            action: change.action(),
        })
    }
}

fn duplicate(event_id: String) -> WebhookOutcome {
    WebhookOutcome {
        event_id,
        duplicate: true,
        action: "none",
    }
}

fn log_failure(event_id: &str, err: &ReconcileError) {
    match err {
        ReconcileError::UnresolvableMetadata(msg) => {
            error!(event_id = %event_id, reason = %msg, "Billing event cannot be attributed to an account")
        }
        other => error!(event_id = %event_id, error = %other, "Billing event reconciliation failed"),
    }
}
