//! WebAPI - Status Reporter
//!
//! ## Responsibilities
//!
//! - Display page with the currently-present counts
//! - Raw/summary log downloads
//! - Reset action
//!
//! Reads registry state on demand; never blocks ingestion beyond the
//! registry's own critical section.

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
    };

    Json(response)
}
