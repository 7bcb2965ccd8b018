//! Expiration sweep
//!
//! One run: take the sweep lease, scan for expired tracks, archive them in
//! batches, and queue a notice per archived track. The HTTP trigger and the
//! internal scheduler both come through [`SweepRunner::run`], so the lease
//! keeps them (and other processes on the same database) single-flight.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trackshare_common::time;
use uuid::Uuid;

use super::archival_executor::ArchivalExecutor;
use super::expiration_scanner::ExpirationScanner;
use super::notification_dispatcher::{ExpirationNotice, NotificationDispatcher};
use crate::db::leases;

pub const SWEEP_LEASE_NAME: &str = "expire-tracks";

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Sweep failed: {0}")]
    Database(#[from] trackshare_common::Error),

    /// The sweep task panicked or was aborted by the runtime
    #[error("Sweep task ended abnormally: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Http,
    Scheduler,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    pub archived: usize,
    pub objects_deleted: usize,
    pub deletion_failures: usize,
    pub skipped_urls: usize,
    pub notices_queued: usize,
    pub batches: usize,
    /// Stopped early on shutdown; remaining tracks are picked up next run
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepSummary),
    /// Another sweep holds the lease
    Skipped,
}

/// Sweep tuning taken from `[sweep]`
#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub batch_size: usize,
    pub lease_ttl: chrono::Duration,
}

pub struct SweepRunner {
    db: SqlitePool,
    scanner: ExpirationScanner,
    archiver: ArchivalExecutor,
    dispatcher: Arc<NotificationDispatcher>,
    settings: SweepSettings,
    shutdown: CancellationToken,
    last_error: RwLock<Option<String>>,
}

impl SweepRunner {
    pub fn new(
        db: SqlitePool,
        scanner: ExpirationScanner,
        archiver: ArchivalExecutor,
        dispatcher: Arc<NotificationDispatcher>,
        settings: SweepSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            scanner,
            archiver,
            dispatcher,
            settings: SweepSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            shutdown,
            last_error: RwLock::new(None),
        }
    }

    /// Error from the most recent failed run, cleared by the next successful one
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Run one sweep evaluated at `now`
    ///
    /// The sweep runs as its own task. Dropping the returned future (a cron
    /// client hanging up mid-run) does not stop it, so archived tracks still get
    /// their deletions, orphan records and notices, and the lease is released.
    pub async fn run(
        self: &Arc<Self>,
        trigger: SweepTrigger,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, SweepError> {
        let runner = Arc::clone(self);
        match tokio::spawn(async move { runner.run_detached(trigger, now).await }).await {
            Ok(result) => result,
            Err(e) => {
                let err = SweepError::Aborted(e.to_string());
                *self.last_error.write().await = Some(err.to_string());
                error!(trigger = ?trigger, error = %err, "Sweep task ended abnormally");
                Err(err)
            }
        }
    }

    async fn run_detached(
        &self,
        trigger: SweepTrigger,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, SweepError> {
        let holder = Uuid::new_v4().to_string();
        // Lease timing uses the wall clock even when `now` is supplied by a caller
        let acquired = leases::try_acquire(
            &self.db,
            SWEEP_LEASE_NAME,
            &holder,
            time::now(),
            self.settings.lease_ttl,
        )
        .await?;
        if !acquired {
            info!(trigger = ?trigger, "Sweep already running; skipped");
            return Ok(SweepOutcome::Skipped);
        }

        info!(trigger = ?trigger, run_id = %holder, "Sweep started");
        let result = self.sweep(now).await;

        if let Err(e) = leases::release(&self.db, SWEEP_LEASE_NAME, &holder).await {
            warn!(run_id = %holder, error = %e, "Failed to release sweep lease; it will expire");
        }

        match &result {
            Ok(summary) => {
                *self.last_error.write().await = None;
                info!(
                    trigger = ?trigger,
                    run_id = %holder,
                    scanned = summary.scanned,
                    archived = summary.archived,
                    objects_deleted = summary.objects_deleted,
                    deletion_failures = summary.deletion_failures,
                    notices_queued = summary.notices_queued,
                    cancelled = summary.cancelled,
                    "Sweep finished"
                );
            }
            Err(e) => {
                *self.last_error.write().await = Some(e.to_string());
                error!(trigger = ?trigger, run_id = %holder, error = %e, "Sweep failed");
            }
        }

        Ok(SweepOutcome::Completed(result?))
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepSummary, SweepError> {
        let expired = self.scanner.find_expired(now).await?;
        let mut summary = SweepSummary {
            scanned: expired.len(),
            ..SweepSummary::default()
        };

        for batch in expired.chunks(self.settings.batch_size) {
            if self.shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let report = self.archiver.archive(batch, now).await?;
            summary.batches += 1;
            summary.archived += report.archived_ids.len();
            summary.objects_deleted += report.deleted_paths.len();
            summary.deletion_failures += report.failed_object_deletions.len();
            summary.skipped_urls += report.skipped_urls.len();

            for track in batch
                .iter()
                .filter(|t| report.archived_ids.contains(&t.track_id))
            {
                let queued = self.dispatcher.notify(ExpirationNotice {
                    track_id: track.track_id.clone(),
                    owner_id: track.owner_id.clone(),
                    contact: track.owner_email.clone(),
                    track_title: track.title.clone(),
                });
                if queued {
                    summary.notices_queued += 1;
                }
            }
        }

        Ok(summary)
    }
}
