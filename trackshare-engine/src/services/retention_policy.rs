//! Tier-dependent retention windows

use chrono::{DateTime, Duration, Utc};
use trackshare_common::config::RetentionConfig;
use trackshare_common::{Result, Tier};

/// Maximum track age per tier, indexed by [`Tier::index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_age: [Duration; Tier::COUNT],
}

impl RetentionPolicy {
    /// Build from configuration; fails on a missing tier or a shrinking window
    pub fn from_config(config: &RetentionConfig) -> Result<Self> {
        config.validate()?;

        let mut max_age = [Duration::zero(); Tier::COUNT];
        for tier in Tier::ALL {
            // validate() guarantees every tier is present
            let days = config.max_age_days.get(&tier).copied().unwrap_or(0);
            max_age[tier.index()] = Duration::days(i64::from(days));
        }
        Ok(Self { max_age })
    }

    pub fn max_age(&self, tier: Tier) -> Duration {
        self.max_age[tier.index()]
    }

    /// Tracks created at or before this instant have expired
    pub fn cutoff(&self, tier: Tier, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.max_age(tier))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_expired(&self, tier: Tier, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at <= self.cutoff(tier, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn policy(free: u32, premium: u32) -> Result<RetentionPolicy> {
        let mut max_age_days = BTreeMap::new();
        max_age_days.insert(Tier::Free, free);
        max_age_days.insert(Tier::Premium, premium);
        RetentionPolicy::from_config(&RetentionConfig { max_age_days })
    }

    #[test]
    fn test_default_windows() {
        let p = RetentionPolicy::from_config(&RetentionConfig::default()).unwrap();
        assert_eq!(p.max_age(Tier::Free), Duration::days(30));
        assert_eq!(p.max_age(Tier::Premium), Duration::days(365));
    }

    #[test]
    fn test_31_day_old_track_expires_only_for_free() {
        let p = policy(30, 365).unwrap();
        let now = Utc::now();
        let created = now - Duration::days(31);

        assert!(p.is_expired(Tier::Free, created, now));
        assert!(!p.is_expired(Tier::Premium, created, now));
    }

    #[test]
    fn test_cutoff_boundary_is_inclusive() {
        let p = policy(30, 365).unwrap();
        let now = Utc::now();
        let cutoff = p.cutoff(Tier::Free, now);

        assert_eq!(cutoff, now - Duration::days(30));
        assert!(p.is_expired(Tier::Free, cutoff, now));
        assert!(!p.is_expired(Tier::Free, cutoff + Duration::milliseconds(1), now));
    }

    #[test]
    fn test_higher_tier_cutoff_never_later() {
        let p = policy(7, 7).unwrap();
        let now = Utc::now();
        assert!(p.cutoff(Tier::Premium, now) <= p.cutoff(Tier::Free, now));
    }

    #[test]
    fn test_shrinking_window_rejected() {
        let err = policy(90, 30).unwrap_err();
        assert!(err.to_string().contains("shorter than"));
    }

    #[test]
    fn test_missing_tier_rejected() {
        let mut max_age_days = BTreeMap::new();
        max_age_days.insert(Tier::Free, 30);
        assert!(RetentionPolicy::from_config(&RetentionConfig { max_age_days }).is_err());
    }
}
