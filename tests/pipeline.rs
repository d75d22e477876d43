//! End-to-end detection pipeline: bytes in, presence counts and CSV logs out.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trail_counter::detection_registry::DetectionRegistry;
use trail_counter::log_sink::{CsvLogSink, RAW_LOG_HEADER, SUMMARY_LOG_HEADER};
use trail_counter::maintenance_scheduler::{MaintenanceConfig, MaintenanceScheduler};
use trail_counter::models::ClassCounts;
use trail_counter::serial_ingest::{IngestChunk, IngestPipeline, CHANNEL_CAPACITY};

struct Harness {
    _dir: tempfile::TempDir,
    registry: Arc<DetectionRegistry>,
    pipeline: Arc<IngestPipeline>,
    scheduler: MaintenanceScheduler,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(CsvLogSink::new(dir.path().join("logs")));
    sink.ensure_headers().await.unwrap();
    let registry = Arc::new(DetectionRegistry::new(sink));
    let pipeline = Arc::new(IngestPipeline::new(registry.clone()));
    let scheduler = MaintenanceScheduler::new(registry.clone(), MaintenanceConfig::default());
    Harness {
        _dir: dir,
        registry,
        pipeline,
        scheduler,
    }
}

/// Push chunks through the pipeline and wait for it to finish
async fn ingest(h: &Harness, chunks: &[&[u8]]) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = h.pipeline.clone().start(rx, CancellationToken::new());
    for chunk in chunks {
        tx.send(IngestChunk::Bytes(chunk.to_vec())).await.unwrap();
    }
    drop(tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_noisy_stream_to_logs() {
    let h = harness().await;
    ingest(
        &h,
        &[
            b"ets Jun  8 2016 00:22:57\r\nrst:0x1 (POWERON_RESET)\r\n",
            b"<W#0123456789AB>\r\n<B#aa:bb:cc:dd:ee:ff>\r\n",
            b"\xff\xfegarbage<B#11:22:33:44:55:66>\r\n",
            b"<W#0123456789AB>\r\n<W#0123456789A|>\r\n<B#AA:BB:CC:DD:EE:FF>\r\n",
        ],
    )
    .await;

    assert_eq!(h.registry.current_counts().await, ClassCounts::new(2, 1));
    assert_eq!(h.registry.rollup_counts().await, ClassCounts::new(2, 1));

    let raw = h.registry.raw_log_contents().await.unwrap();
    let rows: Vec<Vec<&str>> = raw.lines().skip(1).map(|l| l.split(',').collect()).collect();
    assert_eq!(raw.lines().next(), Some(RAW_LOG_HEADER));
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][1..], ["wifi", "0123456789AB"]);
    assert_eq!(&rows[1][1..], ["bt", "aa:bb:cc:dd:ee:ff"]);
    assert_eq!(&rows[2][1..], ["bt", "11:22:33:44:55:66"]);

    let record = h.scheduler.run_flush(Utc::now()).await.unwrap();
    assert_eq!(record.counts, ClassCounts::new(2, 1));
    let summary = h.registry.summary_log_contents().await.unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines[0], SUMMARY_LOG_HEADER);
    assert!(lines[1].ends_with(",2,1"));
    assert_eq!(h.registry.rollup_counts().await, ClassCounts::default());
}

#[tokio::test]
async fn test_rollup_and_presence_windows_differ() {
    let h = harness().await;
    ingest(&h, &[b"<B#aa:bb:cc:dd:ee:ff>\n<W#0123456789AB>\n"]).await;
    h.scheduler.run_flush(Utc::now()).await.unwrap();

    // Same devices again inside the window: present, but not new
    ingest(&h, &[b"<B#aa:bb:cc:dd:ee:ff>\n<W#0123456789AB>\n"]).await;
    assert_eq!(h.registry.current_counts().await, ClassCounts::new(1, 1));
    let record = h.scheduler.run_flush(Utc::now()).await.unwrap();
    assert_eq!(record.counts, ClassCounts::default());

    // After the window they drop out; a fresh sighting counts again
    h.scheduler
        .run_expiry(Utc::now() + Duration::minutes(16))
        .await;
    assert_eq!(h.registry.current_counts().await, ClassCounts::default());
    ingest(&h, &[b"<W#0123456789AB>\n"]).await;
    assert_eq!(h.registry.rollup_counts().await, ClassCounts::new(0, 1));

    let summary = h.registry.summary_log_contents().await.unwrap();
    assert_eq!(summary.lines().count(), 3);
}

#[tokio::test]
async fn test_reset_then_continue() {
    let h = harness().await;
    ingest(&h, &[b"<B#aa:bb:cc:dd:ee:ff>\n"]).await;
    h.scheduler.run_flush(Utc::now()).await.unwrap();

    h.registry.reset().await.unwrap();
    assert_eq!(h.registry.current_counts().await, ClassCounts::default());
    assert_eq!(
        h.registry.summary_log_contents().await.unwrap(),
        format!("{}\n", SUMMARY_LOG_HEADER)
    );

    ingest(&h, &[b"<B#aa:bb:cc:dd:ee:ff>\n"]).await;
    assert_eq!(h.registry.rollup_counts().await, ClassCounts::new(1, 0));
    assert_eq!(h.registry.raw_log_contents().await.unwrap().lines().count(), 2);
}
