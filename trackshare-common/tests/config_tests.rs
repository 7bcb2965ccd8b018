//! Configuration resolution and loading tests
//!
//! Tests that touch TRACKSHARE_* environment variables are marked #[serial] so they
//! never race each other.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use trackshare_common::config::{
    resolve_config_path, EngineConfig, CONFIG_PATH_ENV, CRON_SECRET_ENV, WEBHOOK_SECRET_ENV,
};
use trackshare_common::Tier;

const MINIMAL_TOML: &str = r#"
[sweep]
cron_secret = "file-cron"

[billing]
webhook_secret = "whsec_file"

[storage]
public_url_prefix = "https://cdn.example.com/storage/v1/object/public"
"#;

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    env::set_var(CONFIG_PATH_ENV, "/tmp/from-env.toml");

    let cli = PathBuf::from("/tmp/from-cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    env::set_var(CONFIG_PATH_ENV, "/tmp/trackshare-env.toml");

    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/trackshare-env.toml"))
    );

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_load_reads_file_and_env_secret_wins() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, MINIMAL_TOML).unwrap();

    env::set_var(CRON_SECRET_ENV, "env-cron");
    env::remove_var(WEBHOOK_SECRET_ENV);

    let config = EngineConfig::load(Some(&path)).unwrap();
    assert_eq!(config.sweep.cron_secret, "env-cron");
    assert_eq!(config.billing.webhook_secret, "whsec_file");
    assert_eq!(config.retention.max_age_days[&Tier::Free], 30);

    env::remove_var(CRON_SECRET_ENV);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults_then_fails_validation() {
    env::remove_var(CRON_SECRET_ENV);
    env::remove_var(WEBHOOK_SECRET_ENV);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    // Defaults load fine, but secrets are required to run
    let defaults = EngineConfig::from_file(&path).unwrap();
    assert!(defaults.billing.webhook_secret.is_empty());
    assert!(EngineConfig::load(Some(&path)).is_err());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[sweep\ninterval_secs = ").unwrap();

    let err = EngineConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}
