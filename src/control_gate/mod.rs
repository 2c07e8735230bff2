//! Remote control gate
//!
//! ## Responsibilities
//!
//! - Receive the asynchronous detection on/off flag for this device's user
//! - Fetch the initial flag value once at startup
//! - Feed flag changes to the pipeline supervisor as channel events
//!
//! The gate is a single-consumer channel: producers are the startup fetch
//! and the push-notification endpoint, the consumer is the supervisor loop
//! blocked on `recv()`. No polling anywhere - the loop wakes only on an
//! explicit change event.

use crate::error::{Error, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Control flag change notification, keyed by the owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlNotification {
    /// User identity the flag belongs to
    pub user_id: String,
    /// Whether trigger detection should be running
    pub detection_enabled: bool,
    /// When the flag changed
    pub updated_at: DateTime<Utc>,
}

/// Push-subscription envelope (push endpoint request body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    /// Message body
    pub message: PushMessageBody,
    /// Subscription name
    pub subscription: String,
}

/// Push message body with base64-encoded payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessageBody {
    /// Base64-encoded `ControlNotification` JSON
    pub data: String,
    /// Message id
    pub message_id: String,
    /// Publish time
    pub publish_time: DateTime<Utc>,
    /// Attributes (optional)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// ControlGate: push-notification sink feeding the supervisor channel
pub struct ControlGate {
    /// Only notifications for this user are accepted
    user_id: String,
    tx: mpsc::Sender<bool>,
}

impl ControlGate {
    /// Create the gate and the supervisor's receiving end
    pub fn channel(user_id: String) -> (Arc<Self>, mpsc::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(Self { user_id, tx }), rx)
    }

    /// Handle a push-subscription delivery
    pub async fn handle_push(&self, push: PushMessage) -> Result<()> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&push.message.data)
            .map_err(|e| Error::Parse(format!("failed to decode push message: {}", e)))?;

        let notification: ControlNotification = serde_json::from_slice(&decoded)
            .map_err(|e| Error::Parse(format!("failed to parse notification: {}", e)))?;

        tracing::info!(
            message_id = %push.message.message_id,
            user_id = %notification.user_id,
            detection_enabled = notification.detection_enabled,
            "Received control push notification"
        );

        self.handle_direct(notification).await
    }

    /// Handle a notification delivered without the push envelope
    /// (diagnostics, tests)
    pub async fn handle_direct(&self, notification: ControlNotification) -> Result<()> {
        if notification.user_id != self.user_id {
            tracing::warn!(
                expected_user = %self.user_id,
                received_user = %notification.user_id,
                "Ignoring control notification for different user"
            );
            return Ok(());
        }

        self.set_enabled(notification.detection_enabled).await;
        Ok(())
    }

    /// Enqueue a flag value for the supervisor
    pub async fn set_enabled(&self, enabled: bool) {
        if self.tx.send(enabled).await.is_err() {
            tracing::error!("Control supervisor gone, flag change dropped");
        }
    }
}

/// Initial flag value response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagResponse {
    detection_enabled: bool,
}

/// Fetch the flag's initial value once at startup. Changes after this
/// arrive through the push subscription only.
pub async fn fetch_initial_flag(control_url: &str, user_id: &str, token: &str) -> Result<bool> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .expect("Failed to create HTTP client");

    let url = format!("{}/{}", control_url, user_id);
    let resp = client.get(&url).bearer_auth(token).send().await?;

    if !resp.status().is_success() {
        return Err(Error::Internal(format!(
            "control flag fetch failed: {}",
            resp.status()
        )));
    }

    let flag: FlagResponse = resp
        .json()
        .await
        .map_err(|e| Error::Parse(format!("control flag response: {}", e)))?;

    tracing::info!(
        user_id = %user_id,
        detection_enabled = flag.detection_enabled,
        "Fetched initial control flag"
    );
    Ok(flag.detection_enabled)
}
