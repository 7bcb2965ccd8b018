//! Expired-track selection
//!
//! All tiers are read inside one transaction so a concurrent tier change cannot
//! make a track appear under two windows in the same scan.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::debug;
use trackshare_common::{Result, Tier};

use super::retention_policy::RetentionPolicy;
use crate::db::tracks::{self, ExpiredTrack};

pub struct ExpirationScanner {
    db: SqlitePool,
    policy: RetentionPolicy,
}

impl ExpirationScanner {
    pub fn new(db: SqlitePool, policy: RetentionPolicy) -> Self {
        Self { db, policy }
    }

    /// Every live track past its owner's current retention window, oldest first per tier
    pub async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredTrack>> {
        let mut tx = self.db.begin().await?;

        let mut seen = HashSet::new();
        let mut expired = Vec::new();
        for tier in Tier::ALL {
            let cutoff = self.policy.cutoff(tier, now);
            let found = tracks::find_expired_for_tier(&mut *tx, tier, cutoff).await?;
            debug!(tier = %tier, cutoff = %cutoff, count = found.len(), "Scanned tier");

            for track in found {
                if seen.insert(track.track_id.clone()) {
                    expired.push(track);
                }
            }
        }

        tx.commit().await?;
        Ok(expired)
    }
}
