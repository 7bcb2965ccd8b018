//! Billing provider event model
//!
//! Envelope shape: `{ "id", "type", "created"?, "data": { "object": {...} } }`.
//! The envelope is parsed once during verification; the inner object is only
//! interpreted by the reconciler, per event kind.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Metadata key carrying the local account id on provider objects
pub const USER_ID_METADATA_KEY: &str = "userId";

/// Provider event kinds the engine acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentFailed,
    /// Any other kind; recorded in the ledger, otherwise ignored
    Other(String),
}

impl EventKind {
    /// Parse a provider event type; both `customer.subscription.*` and the short
    /// `subscription.*` forms are accepted.
    pub fn parse(kind: &str) -> Self {
        match kind {
            "customer.subscription.created" | "subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" | "subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" | "subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified provider event
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub kind: EventKind,
    pub created: Option<DateTime<Utc>>,
    /// `data.object` as sent by the provider
    pub object: Value,
    /// Raw body snapshot stored in the ledger
    pub raw: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventData {
    pub object: Value,
}

impl BillingEvent {
    pub(crate) fn from_envelope(envelope: EventEnvelope, raw: String) -> Self {
        Self {
            id: envelope.id,
            kind: EventKind::parse(&envelope.kind),
            created: envelope
                .created
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            object: envelope.data.object,
            raw,
        }
    }

    /// Interpret `data.object` as a subscription
    pub fn subscription(&self) -> Result<SubscriptionObject, serde_json::Error> {
        SubscriptionObject::deserialize(&self.object)
    }

    /// Interpret `data.object` as an invoice
    pub fn invoice(&self) -> Result<InvoiceObject, serde_json::Error> {
        InvoiceObject::deserialize(&self.object)
    }
}

/// Subscription object (event payload or fetched)
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SubscriptionObject {
    pub fn user_id(&self) -> Option<&str> {
        user_id_from(&self.metadata)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

/// Invoice object
///
/// Older API versions put the subscription id at the top level; newer ones nest it
/// under `parent.subscription_details`. Both are read.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

impl InvoiceObject {
    fn details(&self) -> impl Iterator<Item = &SubscriptionDetails> {
        self.subscription_details.iter().chain(
            self.parent
                .iter()
                .filter_map(|p| p.subscription_details.as_ref()),
        )
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or_else(|| self.details().find_map(|d| d.subscription.as_deref()))
            .filter(|id| !id.is_empty())
    }

    /// Account id from the invoice's subscription metadata
    pub fn user_id(&self) -> Option<&str> {
        self.details().find_map(|d| user_id_from(&d.metadata))
    }
}

fn user_id_from(metadata: &HashMap<String, String>) -> Option<&str> {
    metadata
        .get(USER_ID_METADATA_KEY)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}
