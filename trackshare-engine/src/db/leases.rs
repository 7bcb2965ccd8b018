//! Named leases for single-flight background work
//!
//! A lease row is taken over only once it has expired, so a crashed holder blocks
//! other runs for at most its TTL.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, Sqlite};
use trackshare_common::time::to_millis;
use trackshare_common::Result;

/// Try to take lease `name` for `holder`; false if someone else holds it
pub async fn try_acquire<'e, E>(
    executor: E,
    name: &str,
    holder: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let acquired_at = to_millis(now);
    let expires_at = acquired_at.saturating_add(ttl.num_milliseconds());

    let result = sqlx::query(
        r#"
        INSERT INTO sweep_leases (name, holder, acquired_at, expires_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            holder = excluded.holder,
            acquired_at = excluded.acquired_at,
            expires_at = excluded.expires_at
        WHERE sweep_leases.expires_at <= excluded.acquired_at
        "#,
    )
    .bind(name)
    .bind(holder)
    .bind(acquired_at)
    .bind(expires_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a lease held by `holder`; a lease since taken over by another holder is left alone
pub async fn release<'e, E>(executor: E, name: &str, holder: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM sweep_leases WHERE name = ? AND holder = ?")
        .bind(name)
        .bind(holder)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}
