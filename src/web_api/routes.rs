//! API Routes

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::detection_registry::RegistrySnapshot;
use crate::frame_extractor::ExtractorStats;
use crate::log_sink::{RAW_LOG_FILE, SUMMARY_LOG_FILE};
use crate::models::{ApiResponse, ClassCounts};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Display page
        .route("/", get(index))
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(status))
        // Log downloads
        .route("/get_complete_log", get(get_complete_log))
        .route("/get_summary_log", get(get_summary_log))
        // Admin
        .route("/reset_logs", get(reset_logs))
        .with_state(state)
}

// ========================================
// Display page
// ========================================

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.registry.current_counts().await;
    Html(render_index(counts, Local::now()))
}

fn render_index(counts: ClassCounts, now: DateTime<Local>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="60">
  <title>Trail Counter</title>
</head>
<body>
  <h1>Trail Counter</h1>
  <p>The date and time is: {time}</p>
  <p>WiFi devices present: <span id="wifi-count">{wifi}</span></p>
  <p>Bluetooth devices present: <span id="bluetooth-count">{bluetooth}</span></p>
  <p><a href="/get_complete_log">Download complete log</a></p>
  <p><a href="/get_summary_log">Download summary log</a></p>
  <p><a href="/reset_logs" onclick="return confirm('Reset all detections and logs?')">Reset logs</a></p>
</body>
</html>
"#,
        time = now.format("%Y-%m-%d %H:%M"),
        wifi = counts.wifi,
        bluetooth = counts.bluetooth,
    )
}

// ========================================
// Status
// ========================================

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    registry: RegistrySnapshot,
    extractor: ExtractorStats,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.snapshot().await;
    let extractor = state.ingest.stats().await;
    Json(ApiResponse::success(StatusResponse { registry, extractor }))
}

// ========================================
// Log downloads
// ========================================

fn csv_attachment(filename: &str, body: String) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        body,
    )
}

async fn get_complete_log(State(state): State<AppState>) -> crate::Result<impl IntoResponse> {
    let csv = state.registry.raw_log_contents().await?;
    Ok(csv_attachment(RAW_LOG_FILE, csv))
}

async fn get_summary_log(State(state): State<AppState>) -> crate::Result<impl IntoResponse> {
    let csv = state.registry.summary_log_contents().await?;
    Ok(csv_attachment(SUMMARY_LOG_FILE, csv))
}

// ========================================
// Admin
// ========================================

async fn reset_logs(State(state): State<AppState>) -> crate::Result<impl IntoResponse> {
    state.registry.reset().await?;
    tracing::info!("Detections and logs reset via web");
    let counts = state.registry.current_counts().await;
    Ok(Html(render_index(counts, Local::now())))
}
