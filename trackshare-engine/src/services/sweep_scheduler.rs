//! Periodic sweep trigger
//!
//! Owned by the server: started after the database is ready, stopped during
//! graceful shutdown. Ticks that fall behind are skipped rather than replayed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trackshare_common::time;

use super::sweep_runner::{SweepOutcome, SweepRunner, SweepTrigger};

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SweepScheduler {
    runner: Arc<SweepRunner>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl SweepScheduler {
    pub fn new(runner: Arc<SweepRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Start ticking; false if already started
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&self.runner),
            self.interval,
            token.clone(),
        ));
        *running = Some(Running { token, handle });

        info!(interval_secs = self.interval.as_secs(), "Sweep scheduler started");
        true
    }

    /// Stop ticking and wait for an in-progress sweep to finish
    pub async fn stop(&self) {
        let Some(Running { token, handle }) = self.running.lock().await.take() else {
            return;
        };

        token.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Sweep scheduler task ended abnormally");
        }
        info!("Sweep scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn tick_loop(runner: Arc<SweepRunner>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                match runner.run(SweepTrigger::Scheduler, time::now()).await {
                    Ok(SweepOutcome::Completed(summary)) => {
                        debug!(archived = summary.archived, "Scheduled sweep complete");
                    }
                    Ok(SweepOutcome::Skipped) => {
                        debug!("Scheduled sweep skipped; lease held elsewhere");
                    }
                    Err(e) => error!(error = %e, "Scheduled sweep failed"),
                }
            }
        }
    }
}
