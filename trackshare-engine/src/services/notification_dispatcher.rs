//! Fire-and-forget expiration notices
//!
//! Each notice runs as its own tracked task. Failures are logged and dropped;
//! nothing here can fail or delay a sweep.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::notifier::Notifier;

#[derive(Debug, Clone)]
pub struct ExpirationNotice {
    pub track_id: String,
    pub owner_id: String,
    pub contact: Option<String>,
    pub track_title: String,
}

pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    tracker: TaskTracker,
    /// Held across close/wait/reopen so one flush cannot reopen under another
    flushing: Mutex<()>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            tracker: TaskTracker::new(),
            flushing: Mutex::new(()),
        }
    }

    /// Queue a notice; returns false if the owner has no contact address
    pub fn notify(&self, notice: ExpirationNotice) -> bool {
        let Some(contact) = notice.contact.filter(|c| !c.trim().is_empty()) else {
            debug!(
                track_id = %notice.track_id,
                owner_id = %notice.owner_id,
                "Owner has no contact address; notice skipped"
            );
            return false;
        };

        let notifier = Arc::clone(&self.notifier);
        let track_id = notice.track_id;
        let title = notice.track_title;
        self.tracker.spawn(async move {
            if let Err(e) = notifier.send_expiration_notice(&contact, &title).await {
                warn!(track_id = %track_id, error = %e, "Expiration notice failed");
            }
        });
        true
    }

    /// Notices still in flight
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every queued notice has finished
    pub async fn flush(&self) {
        let _guard = self.flushing.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
