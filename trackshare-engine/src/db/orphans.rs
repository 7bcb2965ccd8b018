//! Storage orphan report
//!
//! Archived tracks whose stored object could not be deleted, kept for
//! out-of-band reconciliation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, FromRow, Row, Sqlite};
use trackshare_common::time::{from_millis, to_millis};
use trackshare_common::Result;

#[derive(Debug, Clone, Serialize)]
pub struct StorageOrphan {
    pub id: i64,
    pub track_id: String,
    pub object_url: String,
    pub object_path: Option<String>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for StorageOrphan {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            track_id: row.try_get("track_id")?,
            object_url: row.try_get("object_url")?,
            object_path: row.try_get("object_path")?,
            reason: row.try_get("reason")?,
            recorded_at: from_millis(row.try_get("recorded_at")?),
        })
    }
}

pub async fn record<'e, E>(
    executor: E,
    track_id: &str,
    object_url: &str,
    object_path: Option<&str>,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO storage_orphans (track_id, object_url, object_path, reason, recorded_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(track_id)
    .bind(object_url)
    .bind(object_path)
    .bind(reason)
    .bind(to_millis(now))
    .execute(executor)
    .await?;

    Ok(())
}

/// Most recent orphans first
pub async fn list<'e, E>(executor: E, limit: i64) -> Result<Vec<StorageOrphan>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let orphans = sqlx::query_as::<_, StorageOrphan>(
        r#"
        SELECT id, track_id, object_url, object_path, reason, recorded_at
        FROM storage_orphans
        ORDER BY recorded_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(orphans)
}
