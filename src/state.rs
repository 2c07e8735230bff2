//! Application state
//!
//! Holds configuration and the shared components exposed to the web API

use crate::clip_buffer::ClipBufferConfig;
use crate::control_gate::ControlGate;
use crate::detector::DetectorClient;
use crate::pipeline::RecorderStatus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Device identity reported with every upload
    pub device_id: String,
    /// Human-readable device location
    pub device_location: String,
    /// Account email for the startup sign-in
    pub email: String,
    /// Account password for the startup sign-in
    pub password: String,
    /// API key appended to the identity endpoint
    pub api_key: String,
    /// Identity (sign-in) endpoint
    pub identity_url: String,
    /// Artifact upload endpoint
    pub upload_url: String,
    /// Remote control-flag endpoint (initial value fetch)
    pub control_url: String,
    /// Classifier service base URL
    pub detector_url: String,
    /// Remote MJPEG feed URL
    pub stream_url: String,
    /// Local capture device (e.g. /dev/video0); takes precedence over the
    /// remote feed when set
    pub video_device: Option<String>,
    /// Directory for exported clips
    pub video_dir: PathBuf,
    /// Directory for representative stills
    pub image_dir: PathBuf,
    /// Target bitrate for the re-encode pass
    pub bitrate: String,
    /// Run detection on every Nth ingested frame
    pub detect_every_n: u64,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Ring window and trigger settings
    pub buffer: ClipBufferConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_id: std::env::var("DEVICE_ID").unwrap_or_else(|_| "dev-0000".to_string()),
            device_location: std::env::var("DEVICE_LOCATION")
                .unwrap_or_else(|_| "unknown".to_string()),
            email: std::env::var("EMAIL").unwrap_or_default(),
            password: std::env::var("PASSWORD").unwrap_or_default(),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            identity_url: std::env::var("IDENTITY_URL").unwrap_or_else(|_| {
                "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword".to_string()
            }),
            upload_url: std::env::var("UPLOAD_URL")
                .unwrap_or_else(|_| "http://localhost:3000/upload".to_string()),
            control_url: std::env::var("CONTROL_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api/flags".to_string()),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            stream_url: std::env::var("STREAM_URL")
                .unwrap_or_else(|_| "http://localhost:5000/video_feed".to_string()),
            video_device: std::env::var("VIDEO_DEVICE").ok(),
            video_dir: std::env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/sentrycam/videos")),
            image_dir: std::env::var("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/sentrycam/images")),
            bitrate: std::env::var("BITRATE").unwrap_or_else(|_| "1860k".to_string()),
            detect_every_n: env_u64("DETECT_EVERY_N", 10),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            buffer: ClipBufferConfig {
                fps: env_u64("FPS", 30) as u32,
                pre_roll_secs: env_u64("PRE_ROLL_SECS", 15) as u32,
                total_secs: env_u64("TOTAL_SECS", 30) as u32,
                min_persist: Duration::from_secs(env_u64("MIN_PERSIST_SECS", 2)),
                cooldown: Duration::from_secs(env_u64("COOLDOWN_SECS", 120)),
            },
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Remote control gate (push notification sink)
    pub gate: Arc<ControlGate>,
    /// Classifier adapter (health probe)
    pub detector: Arc<DetectorClient>,
    /// Recorder status snapshot updated by the supervisor
    pub recorder: Arc<RecorderStatus>,
}
