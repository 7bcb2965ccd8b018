//! Account membership persistence
//!
//! Only the subscription reconciler and the customer resolver write here.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};
use trackshare_common::time::to_millis;
use trackshare_common::{Account, Result, Tier};

pub async fn load_account<'e, E>(executor: E, account_id: &str) -> Result<Option<Account>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, email, display_name, tier, billing_customer_id,
               billing_subscription_id, subscription_status
        FROM accounts
        WHERE id = ?
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await?;

    Ok(account)
}

/// Set PREMIUM with the given subscription; returns false if the account does not exist
pub async fn activate_membership<'e, E>(
    executor: E,
    account_id: &str,
    subscription_id: &str,
    status: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET tier = ?, billing_subscription_id = ?, subscription_status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Tier::Premium.as_str())
    .bind(subscription_id)
    .bind(status)
    .bind(to_millis(now))
    .bind(account_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear subscription state and drop to FREE; returns false if the account does not exist
pub async fn revert_to_free<'e, E>(executor: E, account_id: &str, now: DateTime<Utc>) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET tier = ?, billing_subscription_id = NULL, subscription_status = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Tier::Free.as_str())
    .bind(to_millis(now))
    .bind(account_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store a customer id unless one is already set
///
/// Returns false when another writer got there first (or the account is gone).
pub async fn set_customer_if_absent<'e, E>(
    executor: E,
    account_id: &str,
    customer_id: &str,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET billing_customer_id = ?, updated_at = ?
        WHERE id = ? AND billing_customer_id IS NULL
        "#,
    )
    .bind(customer_id)
    .bind(to_millis(now))
    .bind(account_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
