//! Billing customer resolution
//!
//! Each account maps to at most one provider customer. Concurrent first-time
//! resolutions race on a conditional update; the loser adopts the stored id.

use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use trackshare_common::time;

use super::billing_client::{BillingProvider, NewCustomer, ProviderError};
use crate::db::accounts;

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Database(#[from] trackshare_common::Error),
}

pub struct CustomerResolver {
    db: SqlitePool,
    billing: Arc<dyn BillingProvider>,
}

impl CustomerResolver {
    pub fn new(db: SqlitePool, billing: Arc<dyn BillingProvider>) -> Self {
        Self { db, billing }
    }

    /// Return the account's customer id, creating one at the provider if needed
    pub async fn resolve_customer_id(&self, account_id: &str) -> Result<String, CustomerError> {
        let account = accounts::load_account(&self.db, account_id)
            .await?
            .ok_or_else(|| CustomerError::AccountNotFound(account_id.to_string()))?;

        if let Some(existing) = account.billing_customer_id {
            return Ok(existing);
        }

        let created = self
            .billing
            .create_customer(&NewCustomer {
                account_id: account.id.clone(),
                email: account.email.clone(),
                name: account.display_name.clone(),
            })
            .await?;

        if accounts::set_customer_if_absent(&self.db, account_id, &created, time::now()).await? {
            info!(account_id = %account_id, customer_id = %created, "Linked billing customer");
            return Ok(created);
        }

        // Lost the race: adopt whatever was stored first
        let stored = accounts::load_account(&self.db, account_id)
            .await?
            .and_then(|a| a.billing_customer_id)
            .ok_or_else(|| CustomerError::AccountNotFound(account_id.to_string()))?;

        if stored != created {
            warn!(
                account_id = %account_id,
                kept = %stored,
                discarded = %created,
                "Concurrent customer creation; discarded provider customer is unused"
            );
        }
        Ok(stored)
    }
}
