//! Billing provider client
//!
//! The engine needs two provider calls: create a customer for an account, and
//! fetch the current state of a subscription. [`StripeClient`] speaks the
//! provider's form-encoded REST API; tests substitute an in-memory provider.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use trackshare_common::config::BillingConfig;

use super::billing_event::{SubscriptionObject, USER_ID_METADATA_KEY};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Billing provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Billing provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Billing provider has no {0}")]
    NotFound(String),

    #[error("Invalid billing API base URL: {0}")]
    InvalidUrl(String),
}

/// Customer to create at the provider
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub account_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl NewCustomer {
    /// Idempotency key; repeated creates for one account collapse to one customer
    pub fn idempotency_key(&self) -> String {
        format!("customer-{}", self.account_id)
    }
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a customer and return its provider id
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, ProviderError>;

    /// Fetch the current subscription state
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionObject, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct CreatedCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for a Stripe-compatible billing API
pub struct StripeClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trackshare-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let base_url = reqwest::Url::parse(&config.api_base_url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", config.api_base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl(config.api_base_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(what.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or(text);
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, ProviderError> {
        let mut form: Vec<(String, String)> = vec![(
            format!("metadata[{}]", USER_ID_METADATA_KEY),
            customer.account_id.clone(),
        )];
        if let Some(email) = &customer.email {
            form.push(("email".to_string(), email.clone()));
        }
        if let Some(name) = &customer.name {
            form.push(("name".to_string(), name.clone()));
        }

        let response = self
            .client
            .post(self.endpoint(&["v1", "customers"])?)
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", customer.idempotency_key())
            .form(&form)
            .send()
            .await?;
        let created: CreatedCustomer = Self::check(response, "customer").await?.json().await?;

        debug!(account_id = %customer.account_id, customer_id = %created.id, "Created billing customer");
        Ok(created.id)
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionObject, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(&["v1", "subscriptions", subscription_id])?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let subscription = Self::check(response, &format!("subscription {}", subscription_id))
            .await?
            .json()
            .await?;
        Ok(subscription)
    }
}
