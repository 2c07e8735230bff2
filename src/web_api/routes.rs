//! API Routes

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::control_gate::{ControlNotification, PushMessage};
use crate::state::AppState;
use crate::Result;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::device_status))
        // Control flag (push subscription + direct notify)
        .route("/api/control/push", post(handle_control_push))
        .route("/api/control/notify", post(handle_control_notify))
        .with_state(state)
}

/// POST /api/control/push
///
/// Push-subscription delivery of a control flag change
async fn handle_control_push(
    State(state): State<AppState>,
    Json(push): Json<PushMessage>,
) -> Result<Json<serde_json::Value>> {
    state.gate.handle_push(push).await?;
    Ok(Json(json!({ "status": "accepted" })))
}

/// POST /api/control/notify
///
/// Direct flag change without the push envelope (diagnostics)
async fn handle_control_notify(
    State(state): State<AppState>,
    Json(notification): Json<ControlNotification>,
) -> Result<Json<serde_json::Value>> {
    state.gate.handle_direct(notification).await?;
    Ok(Json(json!({ "status": "accepted" })))
}
