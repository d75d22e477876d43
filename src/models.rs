//! Shared models and types for Trail Counter
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp format used in both CSV logs (`2024-05-01 13:45.09`)
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M.%S";

/// Format a timestamp for a log row (local wall clock, like the scanner site)
pub fn format_log_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(LOG_TIME_FORMAT).to_string()
}

/// Radio class a detection was reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Bluetooth,
    Wifi,
}

impl DeviceClass {
    /// Value written to the `Type` column of the raw log
    pub fn log_tag(&self) -> &'static str {
        match self {
            DeviceClass::Bluetooth => "bt",
            DeviceClass::Wifi => "wifi",
        }
    }

    /// Map a frame type tag (`B`/`b`/`W`/`w`)
    pub fn from_frame_tag(tag: char) -> Option<Self> {
        match tag {
            'B' | 'b' => Some(DeviceClass::Bluetooth),
            'W' | 'w' => Some(DeviceClass::Wifi),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_tag())
    }
}

/// Address reported by the scanner, kept verbatim.
///
/// Bluetooth addresses look like `aa:bb:cc:dd:ee:ff`, WiFi addresses like
/// `AABBCCDDEEFF`. The two namespaces are tracked separately by the
/// registry, so the same text under different classes never collides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Accepts only alphanumeric characters and `:`
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == ':') {
            return None;
        }
        Some(Self(raw.to_string()))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accepted frame from the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub device_class: DeviceClass,
    pub address: DeviceAddress,
    pub observed_at: DateTime<Utc>,
}

impl DetectionEvent {
    pub fn new(device_class: DeviceClass, address: DeviceAddress, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_class,
            address,
            observed_at,
        }
    }
}

/// Per-class pair of counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub bluetooth: usize,
    pub wifi: usize,
}

impl ClassCounts {
    pub fn new(bluetooth: usize, wifi: usize) -> Self {
        Self { bluetooth, wifi }
    }
}

/// One row of the summary log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRecord {
    pub flushed_at: DateTime<Utc>,
    pub counts: ClassCounts,
}

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
}
