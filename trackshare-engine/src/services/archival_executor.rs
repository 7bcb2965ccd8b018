//! Archival of expired tracks
//!
//! Archive flags are committed before any storage call, so a track is never
//! visible with its audio gone. Objects that then fail to delete stay behind and
//! are written to the storage orphan report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use trackshare_common::Result;

use super::object_store::ObjectStore;
use crate::db::orphans;
use crate::db::tracks::{self, ExpiredTrack};

/// Reason recorded for URLs outside the configured bucket
pub const REASON_URL_OUTSIDE_BUCKET: &str = "object URL is outside the configured bucket";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedDeletion {
    pub track_id: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedObject {
    pub track_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchivalReport {
    /// Tracks archived by this call (already-archived ids are excluded)
    pub archived_ids: Vec<String>,
    pub deleted_paths: Vec<String>,
    pub failed_object_deletions: Vec<FailedDeletion>,
    pub skipped_urls: Vec<SkippedObject>,
}

pub struct ArchivalExecutor {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    bucket_url_prefix: String,
}

impl ArchivalExecutor {
    /// `bucket_url_prefix` is `<public_url_prefix>/<bucket>/`
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, bucket_url_prefix: String) -> Self {
        Self {
            db,
            store,
            bucket_url_prefix,
        }
    }

    pub async fn archive(
        &self,
        items: &[ExpiredTrack],
        now: DateTime<Utc>,
    ) -> Result<ArchivalReport> {
        let ids: Vec<String> = items.iter().map(|t| t.track_id.clone()).collect();
        let archived_ids = tracks::mark_archived(&self.db, &ids, now).await?;
        let archived: HashSet<&str> = archived_ids.iter().map(String::as_str).collect();

        let mut report = ArchivalReport {
            archived_ids: archived_ids.clone(),
            ..ArchivalReport::default()
        };

        // (track, path) for everything this call archived
        let mut targets: Vec<(&ExpiredTrack, String)> = Vec::new();
        for item in items.iter().filter(|t| archived.contains(t.track_id.as_str())) {
            match object_path_from_url(&item.object_url, &self.bucket_url_prefix) {
                Some(path) => targets.push((item, path)),
                None => {
                    warn!(
                        track_id = %item.track_id,
                        url = %item.object_url,
                        "Object URL does not match bucket prefix; skipping deletion"
                    );
                    report.skipped_urls.push(SkippedObject {
                        track_id: item.track_id.clone(),
                        url: item.object_url.clone(),
                    });
                }
            }
        }

        if !targets.is_empty() {
            let paths: Vec<String> = targets.iter().map(|(_, p)| p.clone()).collect();
            match self.store.delete_objects(&paths).await {
                Ok(deletion) => {
                    let failed: HashSet<&str> = deletion.failed.iter().map(String::as_str).collect();
                    for (item, path) in &targets {
                        if failed.contains(path.as_str()) {
                            report.failed_object_deletions.push(FailedDeletion {
                                track_id: item.track_id.clone(),
                                path: path.clone(),
                                reason: "not confirmed deleted by object store".to_string(),
                            });
                        } else {
                            report.deleted_paths.push(path.clone());
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, count = paths.len(), "Batch object deletion failed");
                    for (item, path) in &targets {
                        report.failed_object_deletions.push(FailedDeletion {
                            track_id: item.track_id.clone(),
                            path: path.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        self.record_orphans(items, &report, now).await;

        info!(
            requested = items.len(),
            archived = report.archived_ids.len(),
            deleted = report.deleted_paths.len(),
            failed = report.failed_object_deletions.len(),
            skipped = report.skipped_urls.len(),
            "Archival batch complete"
        );
        Ok(report)
    }

    /// Best effort: a failure here is logged, the archival itself stands
    async fn record_orphans(&self, items: &[ExpiredTrack], report: &ArchivalReport, now: DateTime<Utc>) {
        if report.failed_object_deletions.is_empty() && report.skipped_urls.is_empty() {
            return;
        }

        if let Err(e) = self.write_orphans(items, report, now).await {
            error!(
                error = %e,
                failed = report.failed_object_deletions.len(),
                skipped = report.skipped_urls.len(),
                "Could not record storage orphans"
            );
        }
    }

    async fn write_orphans(
        &self,
        items: &[ExpiredTrack],
        report: &ArchivalReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for failed in &report.failed_object_deletions {
            let url = items
                .iter()
                .find(|t| t.track_id == failed.track_id)
                .map(|t| t.object_url.as_str())
                .unwrap_or_default();
            orphans::record(&mut *tx, &failed.track_id, url, Some(&failed.path), &failed.reason, now)
                .await?;
        }
        for skipped in &report.skipped_urls {
            orphans::record(
                &mut *tx,
                &skipped.track_id,
                &skipped.url,
                None,
                REASON_URL_OUTSIDE_BUCKET,
                now,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Bucket-relative object path for a public URL, or `None` if the URL lies outside the bucket
///
/// Query strings and fragments (e.g. cache busters) are ignored.
pub fn object_path_from_url(url: &str, bucket_url_prefix: &str) -> Option<String> {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    let path = url[..end].strip_prefix(bucket_url_prefix)?;
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
