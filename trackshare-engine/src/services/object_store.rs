//! Object store client
//!
//! Deletes track audio by bucket-relative path. The production client targets a
//! Supabase-compatible storage API (`DELETE /object/<bucket>` with a `prefixes`
//! body), which answers with the objects it actually removed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use trackshare_common::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Per-path outcome of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    /// Paths the store did not confirm as removed
    pub failed: Vec<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Delete `paths` in one batch call
    async fn delete_objects(&self, paths: &[String]) -> Result<DeletionReport, StorageError>;
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DeletedObject {
    name: String,
}

pub struct StorageClient {
    client: reqwest::Client,
    api_base_url: String,
    bucket: String,
    service_key: String,
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trackshare-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.trim_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for StorageClient {
    async fn delete_objects(&self, paths: &[String]) -> Result<DeletionReport, StorageError> {
        if paths.is_empty() {
            return Ok(DeletionReport::default());
        }

        let response = self
            .client
            .delete(format!("{}/object/{}", self.api_base_url, self.bucket))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&DeleteRequest { prefixes: paths })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let removed: Vec<DeletedObject> = response.json().await?;
        Ok(partition(paths, removed.into_iter().map(|o| o.name)))
    }
}

fn partition(requested: &[String], removed: impl IntoIterator<Item = String>) -> DeletionReport {
    let removed: HashSet<String> = removed.into_iter().collect();
    let (deleted, failed): (Vec<String>, Vec<String>) = requested
        .iter()
        .cloned()
        .partition(|path| removed.contains(path));
    DeletionReport { deleted, failed }
}
