//! SerialIngest - Scanner Serial Link
//!
//! ## Responsibilities
//!
//! - Reset the scanner, open the port, read with a short timeout
//! - Treat a closed/absent port as degraded: back off, reset, reopen
//! - Hand raw bytes to the [`IngestPipeline`] over a bounded channel
//!
//! The reader runs on a blocking thread. The pipeline runs as an async
//! task and owns the [`FrameExtractor`], so framing state is never shared.
//! Every successful open is announced with [`IngestChunk::Reopened`] so the
//! pipeline drops the partial line left over from the previous connection.

use crate::detection_registry::DetectionRegistry;
use crate::error::Result;
use crate::frame_extractor::{ExtractorStats, FrameExtractor};
use crate::models::DetectionEvent;
use crate::scanner_reset::ScannerReset;
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Chunks buffered between the reader thread and the pipeline
pub const CHANNEL_CAPACITY: usize = 64;

/// Message from the reader thread to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestChunk {
    /// Bytes read from the port
    Bytes(Vec<u8>),
    /// The port was (re)opened after a scanner reset
    Reopened,
}

/// Serial link settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(100),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Blocking serial reader
pub struct SerialIngest {
    config: SerialConfig,
    scanner_reset: Arc<dyn ScannerReset>,
}

impl SerialIngest {
    pub fn new(config: SerialConfig, scanner_reset: Arc<dyn ScannerReset>) -> Self {
        Self {
            config,
            scanner_reset,
        }
    }

    /// Start the reader on a blocking thread
    pub fn spawn(self, tx: mpsc::Sender<IngestChunk>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run(tx, shutdown))
    }

    /// Open/read/reopen until shutdown or until the pipeline goes away
    pub fn run(&self, tx: mpsc::Sender<IngestChunk>, shutdown: CancellationToken) {
        tracing::info!(
            port = %self.config.port_name,
            baud = self.config.baud_rate,
            "Serial ingest started"
        );

        while !shutdown.is_cancelled() {
            match self.open_port() {
                Ok(port) => {
                    if tx.blocking_send(IngestChunk::Reopened).is_err() {
                        tracing::debug!("Ingest pipeline closed, stopping reader");
                        break;
                    }
                    if !self.read_until_fault(port, &tx, &shutdown) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        port = %self.config.port_name,
                        error = %e,
                        "Serial port unavailable, will retry"
                    );
                }
            }

            if shutdown.is_cancelled() {
                break;
            }
            std::thread::sleep(self.config.retry_delay);
        }

        tracing::info!("Serial ingest stopped");
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>> {
        self.scanner_reset.reset_scanner()?;
        let port = serialport::new(&self.config.port_name, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .open()?;
        tracing::info!(port = %self.config.port_name, "Serial port opened");
        Ok(port)
    }

    /// Read until an I/O fault (returns true, reopen) or until shutdown or
    /// a closed channel (returns false). The port is closed on return.
    fn read_until_fault(
        &self,
        mut port: Box<dyn SerialPort>,
        tx: &mpsc::Sender<IngestChunk>,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut buf = [0u8; 256];
        loop {
            if shutdown.is_cancelled() {
                return false;
            }
            match port.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => {
                    if tx.blocking_send(IngestChunk::Bytes(buf[..n].to_vec())).is_err() {
                        tracing::debug!("Ingest pipeline closed, stopping reader");
                        return false;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                    continue
                }
                Err(e) => {
                    tracing::warn!(
                        port = %self.config.port_name,
                        error = %e,
                        "Serial read failed, reopening port"
                    );
                    return true;
                }
            }
        }
    }
}

/// Async side of ingestion: bytes -> frames -> registry
pub struct IngestPipeline {
    registry: Arc<DetectionRegistry>,
    stats: RwLock<ExtractorStats>,
}

impl IngestPipeline {
    pub fn new(registry: Arc<DetectionRegistry>) -> Self {
        Self {
            registry,
            stats: RwLock::new(ExtractorStats::default()),
        }
    }

    /// Spawn the pipeline task
    pub fn start(
        self: Arc<Self>,
        rx: mpsc::Receiver<IngestChunk>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(rx, shutdown).await })
    }

    /// Consume chunks until shutdown or until the reader hangs up.
    /// A partial line left at the end, or across a reopen, is discarded.
    pub async fn run(&self, mut rx: mpsc::Receiver<IngestChunk>, shutdown: CancellationToken) {
        let mut extractor = FrameExtractor::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                chunk = rx.recv() => match chunk {
                    Some(IngestChunk::Bytes(bytes)) => {
                        extractor.feed_bytes(&bytes);
                        for event in extractor.drain() {
                            self.ingest(&event).await;
                        }
                        *self.stats.write().await = extractor.stats().clone();
                    }
                    Some(IngestChunk::Reopened) => {
                        if extractor.pending_len() > 0 {
                            tracing::debug!(
                                bytes = extractor.pending_len(),
                                "Port reopened, dropping partial line"
                            );
                        }
                        extractor.clear();
                    }
                    None => break,
                },
            }
        }

        if extractor.pending_len() > 0 {
            tracing::debug!(bytes = extractor.pending_len(), "Discarding partial line");
        }
        extractor.clear();
        tracing::info!("Ingest pipeline stopped");
    }

    async fn ingest(&self, event: &DetectionEvent) {
        match self.registry.record(event).await {
            Ok(true) => tracing::info!(
                device_class = %event.device_class,
                address = %event.address,
                "New detection"
            ),
            Ok(false) => tracing::trace!(
                device_class = %event.device_class,
                address = %event.address,
                "Detection refreshed"
            ),
            Err(e) => tracing::error!(
                device_class = %event.device_class,
                address = %event.address,
                error = %e,
                "Failed to append detection to raw log"
            ),
        }
    }

    /// Extractor counters as of the last processed chunk
    pub async fn stats(&self) -> ExtractorStats {
        self.stats.read().await.clone()
    }
}
