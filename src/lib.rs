//! Trail Counter Library
//!
//! Counts Bluetooth and WiFi devices passing a scanner station. An
//! auxiliary microcontroller reports detected MAC addresses over a serial
//! line; this crate frames that stream, tracks which devices are present
//! and how many new ones arrive per rollup period, and persists both as
//! CSV logs.
//!
//! ## Architecture (6 Components)
//!
//! 1. FrameExtractor - Line reassembly and frame matching on the serial stream
//! 2. DetectionRegistry - Presence tables and rollup counters (single lock)
//! 3. MaintenanceScheduler - Expire and flush timers
//! 4. LogSink - Raw event and summary CSV logs
//! 5. SerialIngest - Scanner reset, port handling, byte pipeline
//! 6. WebAPI - Display page, log downloads, reset
//!
//! ## Data flow
//!
//! ```text
//! serial bytes -> FrameExtractor -> DetectionRegistry::record -> raw log
//! expire timer -> DetectionRegistry::expire_old
//! flush timer  -> DetectionRegistry::flush_rollup -> summary log
//! HTTP         -> DetectionRegistry::current_counts / logs / reset
//! ```

pub mod detection_registry;
pub mod frame_extractor;
pub mod log_sink;
pub mod maintenance_scheduler;
pub mod scanner_reset;
pub mod serial_ingest;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
