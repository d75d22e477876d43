//! DetectionRegistry - Presence Tracking
//!
//! ## Responsibilities
//!
//! - Presence tables (address -> last seen) per device class
//! - Rollup counters: distinct new addresses since the last summary flush
//! - Raw/summary log appends for new devices and flushes
//!
//! ## Locking
//!
//! All state sits behind one mutex, so record/expire/flush/reset/counts
//! never interleave. Log files are written only after the state lock is
//! released; values destined for a log are computed while holding it.
//!
//! File writes are ordered by a second lock (`io`, always taken before
//! `state`). Reset bumps a generation under both, so a raw row for a
//! detection that a reset already discarded is never written, and a
//! summary row is never computed before a reset and appended after it.

use crate::error::Result;
use crate::log_sink::CsvLogSink;
use crate::models::{ClassCounts, DetectionEvent, DeviceAddress, DeviceClass, RollupRecord};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default presence window (15 minutes)
pub const DEFAULT_PRESENCE_WINDOW_SECS: i64 = 15 * 60;

#[derive(Debug, Default)]
struct ClassState {
    present: HashMap<DeviceAddress, DateTime<Utc>>,
    rollup: usize,
}

impl ClassState {
    fn expire(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let before = self.present.len();
        self.present.retain(|_, last_seen| now - *last_seen <= window);
        before - self.present.len()
    }

    fn clear(&mut self) {
        self.present.clear();
        self.rollup = 0;
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    bluetooth: ClassState,
    wifi: ClassState,
    last_flush: Option<DateTime<Utc>>,
    /// Bumped by every reset
    generation: u64,
}

impl RegistryState {
    fn class_mut(&mut self, class: DeviceClass) -> &mut ClassState {
        match class {
            DeviceClass::Bluetooth => &mut self.bluetooth,
            DeviceClass::Wifi => &mut self.wifi,
        }
    }

    fn present_counts(&self) -> ClassCounts {
        ClassCounts::new(self.bluetooth.present.len(), self.wifi.present.len())
    }

    fn rollup_counts(&self) -> ClassCounts {
        ClassCounts::new(self.bluetooth.rollup, self.wifi.rollup)
    }
}

/// Registry snapshot for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistrySnapshot {
    pub present: ClassCounts,
    pub rollup: ClassCounts,
    pub last_flush: Option<DateTime<Utc>>,
}

/// DetectionRegistry instance
pub struct DetectionRegistry {
    state: Mutex<RegistryState>,
    io: Mutex<()>,
    log_sink: Arc<CsvLogSink>,
}

impl DetectionRegistry {
    /// Create an empty registry writing to `log_sink`
    pub fn new(log_sink: Arc<CsvLogSink>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            io: Mutex::new(()),
            log_sink,
        }
    }

    /// Record a detection.
    ///
    /// An address absent from its presence table bumps the rollup counter
    /// and is appended to the raw log. The last-seen time is refreshed
    /// either way. Returns `Ok(true)` for a newly present address.
    ///
    /// A failed raw-log append is returned as an error; the presence and
    /// rollup updates stand. If a reset lands before the row is written,
    /// the row is skipped along with the detection.
    pub async fn record(&self, event: &DetectionEvent) -> Result<bool> {
        let (is_new, generation) = {
            let mut state = self.state.lock().await;
            let generation = state.generation;
            let class = state.class_mut(event.device_class);
            let is_new = class
                .present
                .insert(event.address.clone(), event.observed_at)
                .is_none();
            if is_new {
                class.rollup += 1;
            }
            (is_new, generation)
        };

        if is_new {
            let _io = self.io.lock().await;
            if self.state.lock().await.generation != generation {
                tracing::debug!(address = %event.address, "Reset raced detection, raw row skipped");
                return Ok(is_new);
            }
            self.log_sink.append_event(event).await?;
        }
        Ok(is_new)
    }

    /// Drop presence entries last seen more than `window` before `now`
    pub async fn expire_old(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let mut state = self.state.lock().await;
        let bt = state.bluetooth.expire(now, window);
        let wifi = state.wifi.expire(now, window);
        if bt + wifi > 0 {
            tracing::debug!(bluetooth = bt, wifi = wifi, "Expired stale detections");
        }
        bt + wifi
    }

    /// Append the rollup counts to the summary log and start a new rollup.
    ///
    /// Counters are only reduced after the append succeeds, and only by
    /// the amount that was written, so detections recorded while the file
    /// is being written carry into the next flush. On failure nothing is
    /// reset and the next flush writes the combined total.
    pub async fn flush_rollup(&self, now: DateTime<Utc>) -> Result<RollupRecord> {
        let _io = self.io.lock().await;
        let record = {
            let state = self.state.lock().await;
            RollupRecord {
                flushed_at: now,
                counts: state.rollup_counts(),
            }
        };

        self.log_sink.append_summary(&record).await?;

        let mut state = self.state.lock().await;
        state.bluetooth.rollup = state.bluetooth.rollup.saturating_sub(record.counts.bluetooth);
        state.wifi.rollup = state.wifi.rollup.saturating_sub(record.counts.wifi);
        state.last_flush = Some(now);
        Ok(record)
    }

    /// Live sizes of the presence tables
    pub async fn current_counts(&self) -> ClassCounts {
        self.state.lock().await.present_counts()
    }

    /// New-device counts since the last flush
    pub async fn rollup_counts(&self) -> ClassCounts {
        self.state.lock().await.rollup_counts()
    }

    pub async fn last_flush(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_flush
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock().await;
        RegistrySnapshot {
            present: state.present_counts(),
            rollup: state.rollup_counts(),
            last_flush: state.last_flush,
        }
    }

    pub async fn raw_log_contents(&self) -> Result<String> {
        self.log_sink.raw_contents().await
    }

    pub async fn summary_log_contents(&self) -> Result<String> {
        self.log_sink.summary_contents().await
    }

    /// Forget every detection and truncate both logs to their headers
    pub async fn reset(&self) -> Result<()> {
        let _io = self.io.lock().await;
        {
            let mut state = self.state.lock().await;
            state.bluetooth.clear();
            state.wifi.clear();
            state.generation += 1;
        }
        tracing::info!("Detections reset");
        self.log_sink.reset().await
    }
}
