//! Trail Counter
//!
//! Main entry point: serial ingest, maintenance timers and the status page.

use trail_counter::{
    detection_registry::DetectionRegistry,
    log_sink::CsvLogSink,
    maintenance_scheduler::MaintenanceScheduler,
    scanner_reset::{GpioScannerReset, NoopScannerReset, ScannerReset},
    serial_ingest::{IngestPipeline, SerialIngest, CHANNEL_CAPACITY},
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolve when Ctrl-C or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn build_scanner_reset(config: &AppConfig) -> anyhow::Result<Arc<dyn ScannerReset>> {
    match config.reset_gpio_pin {
        Some(pin) => {
            let reset = GpioScannerReset::new(
                pin,
                Duration::from_secs(config.reset_low_secs),
                Duration::from_secs(config.reset_settle_secs),
            );
            reset.export()?;
            Ok(Arc::new(reset))
        }
        None => {
            tracing::info!("RESET_GPIO_PIN not set, scanner reset disabled");
            Ok(Arc::new(NoopScannerReset))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trail_counter=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trail Counter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    config.validate()?;
    tracing::info!(
        serial_port = %config.serial_port,
        log_dir = %config.log_dir.display(),
        presence_window_secs = config.presence_window_secs,
        expire_interval_secs = config.expire_interval_secs,
        flush_interval_secs = config.flush_interval_secs,
        "Configuration loaded"
    );

    // Logs and registry
    let log_sink = Arc::new(CsvLogSink::new(&config.log_dir));
    log_sink.ensure_headers().await?;
    let registry = Arc::new(DetectionRegistry::new(log_sink));
    tracing::info!("DetectionRegistry initialized");

    let shutdown = CancellationToken::new();

    // Serial ingest: blocking reader -> async pipeline
    let scanner_reset = build_scanner_reset(&config)?;
    let ingest = Arc::new(IngestPipeline::new(registry.clone()));
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let pipeline_task = ingest.clone().start(rx, shutdown.clone());
    let reader_task =
        SerialIngest::new(config.serial_config(), scanner_reset).spawn(tx, shutdown.clone());
    tracing::info!("Serial ingest started");

    // Expire/flush timers
    let scheduler = Arc::new(MaintenanceScheduler::new(
        registry.clone(),
        config.maintenance_config(),
    ));
    let scheduler_task = scheduler.start(shutdown.clone());

    // Status page
    let state = AppState::new(config.clone(), registry, ingest);
    let app = web_api::create_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested");
            server_shutdown.cancel();
        })
        .await?;

    // Server may also stop on its own; make sure every loop sees it
    shutdown.cancel();
    for (name, task) in [
        ("pipeline", pipeline_task),
        ("serial reader", reader_task),
        ("scheduler", scheduler_task),
    ] {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Task ended abnormally");
        }
    }

    tracing::info!("Trail Counter stopped");
    Ok(())
}
