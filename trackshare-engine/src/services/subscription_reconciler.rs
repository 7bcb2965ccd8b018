//! Maps billing events onto account membership
//!
//! Reconciliation is split in two so provider I/O never runs inside a write
//! transaction: [`SubscriptionReconciler::plan`] reads the event (and fetches
//! the subscription for paid invoices), [`SubscriptionReconciler::apply`] writes
//! the result on the caller's connection.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::billing_client::{BillingProvider, ProviderError};
use super::billing_event::{BillingEvent, EventKind};
use crate::db::accounts;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No usable account id on the event, or it names no account
    #[error("Unresolvable metadata: {0}")]
    UnresolvableMetadata(String),

    #[error("Malformed event object: {0}")]
    MalformedObject(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Database(#[from] trackshare_common::Error),
}

/// Membership update derived from one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Activate {
        account_id: String,
        subscription_id: String,
        status: Option<String>,
    },
    Revert {
        account_id: String,
    },
    NoChange {
        reason: String,
    },
}

impl MembershipChange {
    /// Short label reported back to the webhook sender
    pub fn action(&self) -> &'static str {
        match self {
            Self::Activate { .. } => "activated",
            Self::Revert { .. } => "reverted",
            Self::NoChange { .. } => "ignored",
        }
    }
}

pub struct SubscriptionReconciler {
    billing: Arc<dyn BillingProvider>,
}

impl SubscriptionReconciler {
    pub fn new(billing: Arc<dyn BillingProvider>) -> Self {
        Self { billing }
    }

    /// Decide the membership change for `event`
    pub async fn plan(&self, event: &BillingEvent) -> Result<MembershipChange, ReconcileError> {
        match &event.kind {
            EventKind::InvoicePaid => self.plan_invoice_paid(event).await,

            EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
                let subscription = event
                    .subscription()
                    .map_err(|e| ReconcileError::MalformedObject(e.to_string()))?;
                let account_id = subscription
                    .user_id()
                    .ok_or_else(|| missing_user_id(event))?
                    .to_string();
                Ok(MembershipChange::Activate {
                    account_id,
                    subscription_id: subscription.id,
                    status: subscription.status,
                })
            }

            EventKind::SubscriptionDeleted => {
                let subscription = event
                    .subscription()
                    .map_err(|e| ReconcileError::MalformedObject(e.to_string()))?;
                let account_id = subscription
                    .user_id()
                    .ok_or_else(|| missing_user_id(event))?
                    .to_string();
                Ok(MembershipChange::Revert { account_id })
            }

            EventKind::InvoicePaymentFailed => {
                let invoice = event.invoice().ok();
                warn!(
                    event_id = %event.id,
                    invoice_id = invoice.as_ref().map(|i| i.id.as_str()).unwrap_or("unknown"),
                    account_id = invoice.as_ref().and_then(|i| i.user_id()).unwrap_or("unknown"),
                    "Invoice payment failed; membership unchanged until the subscription changes"
                );
                Ok(MembershipChange::NoChange {
                    reason: "payment failure is informational".to_string(),
                })
            }

            EventKind::Other(kind) => {
                debug!(event_id = %event.id, kind = %kind, "Ignoring unhandled event kind");
                Ok(MembershipChange::NoChange {
                    reason: format!("unhandled event kind {}", kind),
                })
            }
        }
    }

    async fn plan_invoice_paid(
        &self,
        event: &BillingEvent,
    ) -> Result<MembershipChange, ReconcileError> {
        let invoice = event
            .invoice()
            .map_err(|e| ReconcileError::MalformedObject(e.to_string()))?;

        let Some(subscription_id) = invoice.subscription_id() else {
            info!(event_id = %event.id, invoice_id = %invoice.id, "Paid invoice has no subscription");
            return Ok(MembershipChange::NoChange {
                reason: "invoice is not for a subscription".to_string(),
            });
        };

        // The invoice may be older than the subscription's latest change; use current state
        let subscription = self.billing.fetch_subscription(subscription_id).await?;

        let account_id = invoice
            .user_id()
            .or_else(|| subscription.user_id())
            .ok_or_else(|| missing_user_id(event))?
            .to_string();

        Ok(MembershipChange::Activate {
            account_id,
            subscription_id: subscription.id,
            status: subscription.status,
        })
    }

    /// Write `change` on `conn` (normally the webhook transaction)
    pub async fn apply(
        conn: &mut SqliteConnection,
        change: &MembershipChange,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        match change {
            MembershipChange::Activate {
                account_id,
                subscription_id,
                status,
            } => {
                let found = accounts::activate_membership(
                    &mut *conn,
                    account_id,
                    subscription_id,
                    status.as_deref(),
                    now,
                )
                .await?;
                if !found {
                    return Err(unknown_account(account_id));
                }
                info!(
                    account_id = %account_id,
                    subscription_id = %subscription_id,
                    status = status.as_deref().unwrap_or("unknown"),
                    "Membership activated"
                );
            }
            MembershipChange::Revert { account_id } => {
                if !accounts::revert_to_free(&mut *conn, account_id, now).await? {
                    return Err(unknown_account(account_id));
                }
                info!(account_id = %account_id, "Membership reverted to FREE");
            }
            MembershipChange::NoChange { .. } => {}
        }
        Ok(())
    }
}

fn missing_user_id(event: &BillingEvent) -> ReconcileError {
    ReconcileError::UnresolvableMetadata(format!(
        "{} event {} carries no userId metadata",
        event.kind, event.id
    ))
}

fn unknown_account(account_id: &str) -> ReconcileError {
    ReconcileError::UnresolvableMetadata(format!("userId {} matches no account", account_id))
}
