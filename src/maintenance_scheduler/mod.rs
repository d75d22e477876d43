//! Maintenance Scheduler
//!
//! Two independent timers against the [`DetectionRegistry`]:
//!
//! - expire (default 1 minute): drop devices not seen within the presence window
//! - flush (default 5 minutes): append rollup counts to the summary log
//!
//! A summary row is written as soon as the scheduler runs, so every
//! restart shows up in the summary series. Runs whether or not any serial
//! bytes arrive. Stops cooperatively when the shutdown token is cancelled,
//! between ticks.

use crate::detection_registry::{DetectionRegistry, DEFAULT_PRESENCE_WINDOW_SECS};
use crate::models::RollupRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Timer settings
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub expire_interval: Duration,
    pub flush_interval: Duration,
    pub presence_window: chrono::Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            expire_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(300),
            presence_window: chrono::Duration::seconds(DEFAULT_PRESENCE_WINDOW_SECS),
        }
    }
}

/// Expire/flush scheduler
pub struct MaintenanceScheduler {
    registry: Arc<DetectionRegistry>,
    config: MaintenanceConfig,
}

impl MaintenanceScheduler {
    pub fn new(registry: Arc<DetectionRegistry>, config: MaintenanceConfig) -> Self {
        Self { registry, config }
    }

    /// Start the scheduler (background task)
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            expire_secs = self.config.expire_interval.as_secs(),
            flush_secs = self.config.flush_interval.as_secs(),
            window_secs = self.config.presence_window.num_seconds(),
            "Maintenance scheduler started"
        );
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        // Startup row; a failure is logged like any other flush
        self.run_flush(Utc::now()).await;

        let start = Instant::now();
        let mut expire_timer =
            interval_at(start + self.config.expire_interval, self.config.expire_interval);
        expire_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush_timer =
            interval_at(start + self.config.flush_interval, self.config.flush_interval);
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = expire_timer.tick() => {
                    self.run_expiry(Utc::now()).await;
                }
                _ = flush_timer.tick() => {
                    self.run_flush(Utc::now()).await;
                }
            }
        }

        info!("Maintenance scheduler stopped");
    }

    /// One expire tick
    pub async fn run_expiry(&self, now: DateTime<Utc>) -> usize {
        let removed = self
            .registry
            .expire_old(now, self.config.presence_window)
            .await;
        let counts = self.registry.current_counts().await;
        debug!(
            removed = removed,
            bluetooth = counts.bluetooth,
            wifi = counts.wifi,
            "Expire tick"
        );
        removed
    }

    /// One flush tick. A failed append is logged and the counters kept.
    pub async fn run_flush(&self, now: DateTime<Utc>) -> Option<RollupRecord> {
        match self.registry.flush_rollup(now).await {
            Ok(record) => {
                info!(
                    bluetooth = record.counts.bluetooth,
                    wifi = record.counts.wifi,
                    "Updating summary"
                );
                Some(record)
            }
            Err(e) => {
                error!(error = %e, "Summary flush failed, keeping rollup counts");
                None
            }
        }
    }
}
