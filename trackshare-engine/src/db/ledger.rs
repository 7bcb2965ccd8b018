//! Processed-event ledger
//!
//! A row exists for an event id iff its side effects were committed. The insert
//! shares a transaction with the membership update, so a rollback removes both.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};
use trackshare_common::time::to_millis;
use trackshare_common::{ProcessedEvent, Result};

/// Insert the event id; false means it was already recorded
pub async fn record_if_new<'e, E>(
    executor: E,
    event_id: &str,
    kind: &str,
    payload: &str,
    received_at: DateTime<Utc>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO processed_events (event_id, kind, received_at, payload)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(kind)
    .bind(to_millis(received_at))
    .bind(payload)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Read-only check used to short-circuit redeliveries before any provider call
pub async fn is_processed<'e, E>(executor: E, event_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM processed_events WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(executor)
            .await?;

    Ok(found.is_some())
}

pub async fn load_event<'e, E>(executor: E, event_id: &str) -> Result<Option<ProcessedEvent>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let event = sqlx::query_as::<_, ProcessedEvent>(
        "SELECT event_id, kind, received_at, payload FROM processed_events WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_optional(executor)
    .await?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trackshare_common::db::init_database;

    #[tokio::test]
    async fn test_second_insert_is_not_new() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("ledger.db")).await.unwrap();
        let now = Utc::now();

        assert!(!is_processed(&pool, "evt_1").await.unwrap());
        assert!(record_if_new(&pool, "evt_1", "invoice.paid", "{}", now).await.unwrap());
        assert!(!record_if_new(&pool, "evt_1", "invoice.paid", "{}", now).await.unwrap());
        assert!(is_processed(&pool, "evt_1").await.unwrap());

        let stored = load_event(&pool, "evt_1").await.unwrap().unwrap();
        assert_eq!(stored.kind, "invoice.paid");
        assert_eq!(stored.received_at.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_rolled_back_insert_leaves_no_row() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("ledger.db")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert!(record_if_new(&mut *tx, "evt_2", "invoice.paid", "{}", Utc::now())
            .await
            .unwrap());
        tx.rollback().await.unwrap();

        assert!(!is_processed(&pool, "evt_2").await.unwrap());
    }
}
