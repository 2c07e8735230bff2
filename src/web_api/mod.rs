//! WebAPI - device-local HTTP endpoints
//!
//! ## Responsibilities
//!
//! - Health and recorder status
//! - Control-flag push subscription receiver

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let detector_ok = state.detector.health_check().await.unwrap_or(false);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "detector_connected": detector_ok,
    }))
}

/// Device status endpoint
pub async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "device_id": state.config.device_id,
        "device_location": state.config.device_location,
        "firmware_version": env!("CARGO_PKG_VERSION"),
        "recording": state.recorder.is_running(),
        "armed": state.recorder.is_armed().await,
        "window_frames": state.recorder.window_len().await,
    }))
}
