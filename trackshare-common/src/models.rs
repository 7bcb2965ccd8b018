//! Database models
//!
//! Row types for accounts, tracks, stored objects and the processed-event ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

use crate::time::from_millis;
use crate::Error;

/// Membership tier
///
/// Ordered from lowest to highest; retention windows must never shrink as the
/// tier increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub const COUNT: usize = 2;

    /// Every tier, lowest first
    pub const ALL: [Tier; Tier::COUNT] = [Tier::Free, Tier::Premium];

    /// Stored representation in `accounts.tier`
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Premium => "PREMIUM",
        }
    }

    /// Position in [`Tier::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Tier::Free => 0,
            Tier::Premium => 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Tier::Free),
            "PREMIUM" => Ok(Tier::Premium),
            other => Err(Error::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}

/// Account membership state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub tier: Tier,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub subscription_status: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for Account {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let tier: String = row.try_get("tier")?;
        let tier = tier.parse::<Tier>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "tier".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            tier,
            billing_customer_id: row.try_get("billing_customer_id")?,
            billing_subscription_id: row.try_get("billing_subscription_id")?,
            subscription_status: row.try_get("subscription_status")?,
        })
    }
}

/// Shared track (content item)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub object_id: String,
}

impl<'r> FromRow<'r, SqliteRow> for Track {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let archived_at: Option<i64> = row.try_get("archived_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            created_at: from_millis(row.try_get("created_at")?),
            archived: row.try_get("archived")?,
            archived_at: archived_at.map(from_millis),
            is_public: row.try_get("is_public")?,
            object_id: row.try_get("object_id")?,
        })
    }
}

/// Backing object for a track in the object store
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredObject {
    pub id: String,
    /// Absolute public URL as recorded by the upload path
    pub url: String,
    pub content_type: String,
    pub byte_size: i64,
}

/// Ledger entry for an already-applied billing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub kind: String,
    pub received_at: DateTime<Utc>,
    pub payload: String,
}

impl<'r> FromRow<'r, SqliteRow> for ProcessedEvent {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            event_id: row.try_get("event_id")?,
            kind: row.try_get("kind")?,
            received_at: from_millis(row.try_get("received_at")?),
            payload: row.try_get("payload")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_trips_through_storage_form() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_unknown_tier_rejected() {
        assert!("GOLD".parse::<Tier>().is_err());
        assert!("free".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_order_matches_all() {
        assert!(Tier::Free < Tier::Premium);
        for (i, tier) in Tier::ALL.iter().enumerate() {
            assert_eq!(tier.index(), i);
        }
    }

    #[test]
    fn test_tier_serde_uses_screaming_case() {
        let json = serde_json::to_string(&Tier::Premium).unwrap();
        assert_eq!(json, "\"PREMIUM\"");
    }
}
