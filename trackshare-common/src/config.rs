//! Configuration loading and resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TRACKSHARE_CONFIG` environment variable
//! 3. Per-user config file (`~/.config/trackshare/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! Secrets may additionally be supplied through environment variables, which override
//! whatever the TOML file contains. A missing config file is not fatal; the engine starts
//! from defaults and `validate()` reports anything that still needs to be provided.

use crate::{Error, Result, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "TRACKSHARE_CONFIG";
pub const WEBHOOK_SECRET_ENV: &str = "TRACKSHARE_WEBHOOK_SECRET";
pub const CRON_SECRET_ENV: &str = "TRACKSHARE_CRON_SECRET";
pub const BILLING_API_KEY_ENV: &str = "TRACKSHARE_BILLING_API_KEY";
pub const STORAGE_KEY_ENV: &str = "TRACKSHARE_STORAGE_KEY";
pub const NOTIFY_API_KEY_ENV: &str = "TRACKSHARE_NOTIFY_API_KEY";

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub retention: RetentionConfig,
    pub sweep: SweepConfig,
    pub billing: BillingConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("trackshare.db"),
        }
    }
}

/// Per-tier maximum track age
///
/// ```toml
/// [retention.max_age_days]
/// FREE = 30
/// PREMIUM = 365
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: BTreeMap<Tier, u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let mut max_age_days = BTreeMap::new();
        max_age_days.insert(Tier::Free, 30);
        max_age_days.insert(Tier::Premium, 365);
        Self { max_age_days }
    }
}

impl RetentionConfig {
    /// Check that every tier has a window and windows never shrink as the tier rises
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<(Tier, u32)> = None;
        for tier in Tier::ALL {
            let days = *self.max_age_days.get(&tier).ok_or_else(|| {
                Error::Config(format!("retention.max_age_days is missing an entry for {}", tier))
            })?;

            if let Some((lower, lower_days)) = previous {
                if days < lower_days {
                    return Err(Error::Config(format!(
                        "retention for {} ({} days) is shorter than for lower tier {} ({} days)",
                        tier, days, lower, lower_days
                    )));
                }
            }
            previous = Some((tier, days));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the internal scheduler (the HTTP trigger is always available)
    pub enabled: bool,
    pub interval_secs: u64,
    /// Lease lifetime; a crashed sweep blocks others for at most this long
    pub lease_ttl_secs: u64,
    pub batch_size: usize,
    /// Shared secret for the HTTP sweep trigger and internal endpoints
    pub cron_secret: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            lease_ttl_secs: 900,
            batch_size: 200,
            cron_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub api_base_url: String,
    pub api_key: String,
    /// Webhook signing secret shared with the provider
    pub webhook_secret: String,
    pub signature_tolerance_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.stripe.com".to_string(),
            api_key: String::new(),
            webhook_secret: String::new(),
            signature_tolerance_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage REST API root, e.g. `https://<project>.supabase.co/storage/v1`
    pub api_base_url: String,
    /// Prefix of public object URLs before the bucket segment
    pub public_url_prefix: String,
    /// Bucket holding track audio
    pub bucket: String,
    pub service_key: String,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            public_url_prefix: String::new(),
            bucket: "tracks".to_string(),
            service_key: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    /// `<public_url_prefix>/<bucket>/`, stripped from stored URLs to get object paths
    pub fn bucket_url_prefix(&self) -> String {
        format!(
            "{}/{}/",
            self.public_url_prefix.trim_end_matches('/'),
            self.bucket.trim_matches('/')
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Mail relay endpoint; notices are only logged when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Resolve, load, apply environment overrides and validate
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                warn!("No config file found, using compiled defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; a missing file yields defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config file: {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Overlay secrets from the environment (or any key lookup)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = non_empty(WEBHOOK_SECRET_ENV) {
            self.billing.webhook_secret = v;
        }
        if let Some(v) = non_empty(CRON_SECRET_ENV) {
            self.sweep.cron_secret = v;
        }
        if let Some(v) = non_empty(BILLING_API_KEY_ENV) {
            self.billing.api_key = v;
        }
        if let Some(v) = non_empty(STORAGE_KEY_ENV) {
            self.storage.service_key = v;
        }
        if let Some(v) = non_empty(NOTIFY_API_KEY_ENV) {
            self.notifications.api_key = Some(v);
        }
    }

    /// Reject configurations the engine cannot run safely with
    pub fn validate(&self) -> Result<()> {
        if self.billing.webhook_secret.is_empty() {
            return Err(Error::Config(format!(
                "billing.webhook_secret is not set (or set {})",
                WEBHOOK_SECRET_ENV
            )));
        }
        if self.sweep.cron_secret.is_empty() {
            return Err(Error::Config(format!(
                "sweep.cron_secret is not set (or set {})",
                CRON_SECRET_ENV
            )));
        }
        if self.sweep.interval_secs == 0 {
            return Err(Error::Config("sweep.interval_secs must be positive".to_string()));
        }
        if self.sweep.batch_size == 0 {
            return Err(Error::Config("sweep.batch_size must be positive".to_string()));
        }
        if self.storage.public_url_prefix.is_empty() || self.storage.bucket.is_empty() {
            return Err(Error::Config(
                "storage.public_url_prefix and storage.bucket are required".to_string(),
            ));
        }
        self.retention.validate()
    }
}

/// Pick the config file path by priority; `None` means compiled defaults
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("trackshare").join("config.toml"))
        .filter(|p| p.exists())
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("trackshare"))
        .unwrap_or_else(|| PathBuf::from("./trackshare_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.billing.webhook_secret = "whsec_test".to_string();
        config.sweep.cron_secret = "cron".to_string();
        config.storage.public_url_prefix = "https://cdn.example.com/storage/v1/object/public".to_string();
        config
    }

    #[test]
    fn test_defaults_match_documented_windows() {
        let config = EngineConfig::default();
        assert_eq!(config.retention.max_age_days[&Tier::Free], 30);
        assert_eq!(config.retention.max_age_days[&Tier::Premium], 365);
        assert!(config.retention.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [server]
            bind_addr = "0.0.0.0:8080"

            [retention.max_age_days]
            FREE = 7
            PREMIUM = 90

            [sweep]
            interval_secs = 60
            cron_secret = "s3cret"

            [billing]
            webhook_secret = "whsec_abc"

            [storage]
            public_url_prefix = "https://x.supabase.co/storage/v1/object/public"
            bucket = "audio"
        "#;

        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.retention.max_age_days[&Tier::Free], 7);
        assert_eq!(config.retention.max_age_days[&Tier::Premium], 90);
        assert_eq!(config.sweep.interval_secs, 60);
        // Unspecified fields keep defaults
        assert_eq!(config.sweep.lease_ttl_secs, 900);
        assert_eq!(config.billing.signature_tolerance_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_tier_key_rejected() {
        let toml = r#"
            [retention.max_age_days]
            GOLD = 10
        "#;
        assert!(EngineConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_non_monotonic_retention_rejected() {
        let mut config = valid_config();
        config.retention.max_age_days.insert(Tier::Free, 400);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than"));
    }

    #[test]
    fn test_missing_tier_entry_rejected() {
        let mut config = valid_config();
        config.retention.max_age_days.remove(&Tier::Premium);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_secrets_rejected() {
        let mut config = valid_config();
        config.sweep.cron_secret.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.billing.webhook_secret.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_secrets_but_ignore_empty_values() {
        let mut config = valid_config();
        config.apply_overrides(|key| match key {
            CRON_SECRET_ENV => Some("from-env".to_string()),
            WEBHOOK_SECRET_ENV => Some(String::new()),
            NOTIFY_API_KEY_ENV => Some("mail-key".to_string()),
            _ => None,
        });

        assert_eq!(config.sweep.cron_secret, "from-env");
        assert_eq!(config.billing.webhook_secret, "whsec_test");
        assert_eq!(config.notifications.api_key.as_deref(), Some("mail-key"));
    }

    #[test]
    fn test_bucket_url_prefix_normalizes_slashes() {
        let mut storage = StorageConfig::default();
        storage.public_url_prefix = "https://cdn.example.com/public/".to_string();
        storage.bucket = "/tracks/".to_string();
        assert_eq!(storage.bucket_url_prefix(), "https://cdn.example.com/public/tracks/");
    }
}
