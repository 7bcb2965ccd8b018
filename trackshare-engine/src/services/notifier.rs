//! Outbound notification capability
//!
//! The engine only asks for an "expiration notice" to be sent; rendering belongs
//! to the mail relay behind [`MailRelayNotifier`].

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use trackshare_common::config::NotificationConfig;

/// Template identifier understood by the mail relay
pub const EXPIRATION_TEMPLATE: &str = "track-expired";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification relay returned {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_expiration_notice(&self, contact: &str, track_title: &str)
        -> Result<(), NotifyError>;
}

/// Posts notices to an HTTP mail relay
pub struct MailRelayNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: Option<String>,
}

impl MailRelayNotifier {
    pub fn new(endpoint: impl Into<String>, config: &NotificationConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trackshare-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send_expiration_notice(
        &self,
        contact: &str,
        track_title: &str,
    ) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "template": EXPIRATION_TEMPLATE,
            "to": contact,
            "from": self.from_address,
            "data": { "trackTitle": track_title },
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Logs notices instead of sending them (no relay configured)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_expiration_notice(
        &self,
        contact: &str,
        track_title: &str,
    ) -> Result<(), NotifyError> {
        info!(contact = %contact, track_title = %track_title, "Expiration notice (no relay configured)");
        Ok(())
    }
}
