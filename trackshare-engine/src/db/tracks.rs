//! Track lifecycle queries

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, FromRow, QueryBuilder, Row, Sqlite};
use trackshare_common::time::{from_millis, to_millis};
use trackshare_common::{Result, Tier, Track};

/// Non-archived track past its owner's retention window, with what archival needs
#[derive(Debug, Clone, Serialize)]
pub struct ExpiredTrack {
    pub track_id: String,
    pub title: String,
    pub owner_id: String,
    pub owner_email: Option<String>,
    pub owner_tier: Tier,
    pub created_at: DateTime<Utc>,
    pub object_id: String,
    pub object_url: String,
}

impl<'r> FromRow<'r, SqliteRow> for ExpiredTrack {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let tier: String = row.try_get("owner_tier")?;
        let owner_tier = tier.parse::<Tier>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "owner_tier".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            track_id: row.try_get("track_id")?,
            title: row.try_get("title")?,
            owner_id: row.try_get("owner_id")?,
            owner_email: row.try_get("owner_email")?,
            owner_tier,
            created_at: from_millis(row.try_get("created_at")?),
            object_id: row.try_get("object_id")?,
            object_url: row.try_get("object_url")?,
        })
    }
}

/// Live tracks whose owner is currently on `tier` and that were created at or before `cutoff`
pub async fn find_expired_for_tier<'e, E>(
    executor: E,
    tier: Tier,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ExpiredTrack>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let tracks = sqlx::query_as::<_, ExpiredTrack>(
        r#"
        SELECT t.id AS track_id, t.title, t.owner_id, a.email AS owner_email,
               a.tier AS owner_tier, t.created_at, o.id AS object_id, o.url AS object_url
        FROM tracks t
        JOIN accounts a ON a.id = t.owner_id
        JOIN stored_objects o ON o.id = t.object_id
        WHERE t.archived = 0 AND a.tier = ? AND t.created_at <= ?
        ORDER BY t.created_at, t.id
        "#,
    )
    .bind(tier.as_str())
    .bind(to_millis(cutoff))
    .fetch_all(executor)
    .await?;

    Ok(tracks)
}

/// Flip `archived` for the given ids in one statement
///
/// Returns the ids this call actually archived; tracks already archived (for
/// example by a concurrent sweep) are not returned.
pub async fn mark_archived<'e, E>(
    executor: E,
    track_ids: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if track_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE tracks SET archived = 1, archived_at = ");
    builder.push_bind(to_millis(now));
    builder.push(" WHERE archived = 0 AND id IN (");
    let mut separated = builder.separated(", ");
    for id in track_ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(") RETURNING id");

    let archived = builder
        .build_query_scalar::<String>()
        .fetch_all(executor)
        .await?;

    Ok(archived)
}

pub async fn load_track<'e, E>(executor: E, track_id: &str) -> Result<Option<Track>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let track = sqlx::query_as::<_, Track>(
        r#"
        SELECT id, owner_id, title, created_at, archived, archived_at, is_public, object_id
        FROM tracks
        WHERE id = ?
        "#,
    )
    .bind(track_id)
    .fetch_optional(executor)
    .await?;

    Ok(track)
}
