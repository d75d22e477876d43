//! Application state
//!
//! Holds all shared components and configuration

use crate::detection_registry::{DetectionRegistry, DEFAULT_PRESENCE_WINDOW_SECS};
use crate::error::{Error, Result};
use crate::maintenance_scheduler::MaintenanceConfig;
use crate::serial_ingest::{IngestPipeline, SerialConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Scanner serial device
    pub serial_port: String,
    pub serial_baud: u32,
    pub serial_timeout_ms: u64,
    /// Back-off before reopening a failed port
    pub serial_retry_secs: u64,
    /// Directory holding complete_log.csv and summary_log.csv
    pub log_dir: PathBuf,
    pub presence_window_secs: i64,
    pub expire_interval_secs: u64,
    pub flush_interval_secs: u64,
    /// sysfs GPIO pin wired to the scanner reset line (None = no pulse)
    pub reset_gpio_pin: Option<u32>,
    pub reset_low_secs: u64,
    pub reset_settle_secs: u64,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial_port: std::env::var("SERIAL_PORT")
                .unwrap_or_else(|_| "/dev/ttyUSB0".to_string()),
            serial_baud: env_or("SERIAL_BAUD", 9600),
            serial_timeout_ms: env_or("SERIAL_TIMEOUT_MS", 100),
            serial_retry_secs: env_or("SERIAL_RETRY_SECS", 1),
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/trail-counter/logs")),
            presence_window_secs: env_or("PRESENCE_WINDOW_SECS", DEFAULT_PRESENCE_WINDOW_SECS),
            expire_interval_secs: env_or("EXPIRE_INTERVAL_SECS", 60),
            flush_interval_secs: env_or("FLUSH_INTERVAL_SECS", 300),
            reset_gpio_pin: std::env::var("RESET_GPIO_PIN")
                .ok()
                .and_then(|p| p.parse().ok()),
            reset_low_secs: env_or("RESET_LOW_SECS", 10),
            reset_settle_secs: env_or("RESET_SETTLE_SECS", 10),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 80),
        }
    }
}

impl AppConfig {
    /// Reject settings that would stall or break the timers
    pub fn validate(&self) -> Result<()> {
        if self.presence_window_secs <= 0 {
            return Err(Error::Config("PRESENCE_WINDOW_SECS must be positive".to_string()));
        }
        if self.expire_interval_secs == 0 {
            return Err(Error::Config("EXPIRE_INTERVAL_SECS must be positive".to_string()));
        }
        if self.flush_interval_secs == 0 {
            return Err(Error::Config("FLUSH_INTERVAL_SECS must be positive".to_string()));
        }
        if self.serial_timeout_ms == 0 {
            return Err(Error::Config("SERIAL_TIMEOUT_MS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port_name: self.serial_port.clone(),
            baud_rate: self.serial_baud,
            read_timeout: Duration::from_millis(self.serial_timeout_ms),
            retry_delay: Duration::from_secs(self.serial_retry_secs),
        }
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            expire_interval: Duration::from_secs(self.expire_interval_secs),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            presence_window: chrono::Duration::seconds(self.presence_window_secs),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// DetectionRegistry (presence + rollups + logs)
    pub registry: Arc<DetectionRegistry>,
    /// IngestPipeline (extractor stats)
    pub ingest: Arc<IngestPipeline>,
    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<DetectionRegistry>, ingest: Arc<IngestPipeline>) -> Self {
        Self {
            config,
            registry,
            ingest,
            started_at: Instant::now(),
        }
    }
}
