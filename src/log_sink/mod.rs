//! LogSink - Append-only CSV Logs
//!
//! ## Responsibilities
//!
//! - Raw event log (`complete_log.csv`): one row per newly present device
//! - Summary log (`summary_log.csv`): one row per rollup flush
//! - Header bootstrap on startup, truncate-to-header on reset
//!
//! Each append opens the file, writes one line and closes it again, so a
//! log downloaded mid-run is always a complete CSV.

use crate::error::{Error, Result};
use crate::models::{format_log_time, DetectionEvent, RollupRecord};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const RAW_LOG_FILE: &str = "complete_log.csv";
pub const SUMMARY_LOG_FILE: &str = "summary_log.csv";

pub const RAW_LOG_HEADER: &str = "Datetime, Type, Address";
pub const SUMMARY_LOG_HEADER: &str = "Datetime, Bluetooth Count, WiFi Count";

/// CSV file pair under one log directory
#[derive(Debug, Clone)]
pub struct CsvLogSink {
    raw_path: PathBuf,
    summary_path: PathBuf,
}

impl CsvLogSink {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let dir = log_dir.as_ref();
        Self {
            raw_path: dir.join(RAW_LOG_FILE),
            summary_path: dir.join(SUMMARY_LOG_FILE),
        }
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Create missing log files with their header rows; keep existing history
    pub async fn ensure_headers(&self) -> Result<()> {
        for (path, header) in self.files() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::persistence(parent, e))?;
            }
            if !fs::try_exists(path).await.unwrap_or(false) {
                write_header(path, header).await?;
                tracing::info!(path = %path.display(), "Created log file");
            }
        }
        Ok(())
    }

    pub async fn append_event(&self, event: &DetectionEvent) -> Result<()> {
        let line = format!(
            "{},{},{}",
            format_log_time(event.observed_at),
            event.device_class.log_tag(),
            event.address
        );
        append_line(&self.raw_path, RAW_LOG_HEADER, &line).await
    }

    pub async fn append_summary(&self, record: &RollupRecord) -> Result<()> {
        let line = format!(
            "{},{},{}",
            format_log_time(record.flushed_at),
            record.counts.bluetooth,
            record.counts.wifi
        );
        append_line(&self.summary_path, SUMMARY_LOG_HEADER, &line).await
    }

    pub async fn raw_contents(&self) -> Result<String> {
        read_log(&self.raw_path, RAW_LOG_HEADER).await
    }

    pub async fn summary_contents(&self) -> Result<String> {
        read_log(&self.summary_path, SUMMARY_LOG_HEADER).await
    }

    /// Truncate both logs back to their header rows
    pub async fn reset(&self) -> Result<()> {
        for (path, header) in self.files() {
            write_header(path, header).await?;
        }
        tracing::info!("Logs reset to header-only");
        Ok(())
    }

    fn files(&self) -> [(&Path, &'static str); 2] {
        [
            (self.raw_path.as_path(), RAW_LOG_HEADER),
            (self.summary_path.as_path(), SUMMARY_LOG_HEADER),
        ]
    }
}

async fn write_header(path: &Path, header: &str) -> Result<()> {
    fs::write(path, format!("{}\n", header))
        .await
        .map_err(|e| Error::persistence(path, e))
}

async fn append_line(path: &Path, header: &str, line: &str) -> Result<()> {
    // A log deleted underneath us comes back with its header
    if !fs::try_exists(path).await.unwrap_or(false) {
        write_header(path, header).await?;
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .map_err(|e| Error::persistence(path, e))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .await
        .map_err(|e| Error::persistence(path, e))?;
    file.flush().await.map_err(|e| Error::persistence(path, e))?;
    Ok(())
}

async fn read_log(path: &Path, header: &str) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(format!("{}\n", header)),
        Err(e) => Err(Error::persistence(path, e)),
    }
}
