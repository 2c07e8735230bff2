//! Sentrycam - edge camera clip recorder
//!
//! Continuously ingests a live frame stream into a fixed-memory circular
//! buffer, samples it for an unrecognized-face trigger, and records a
//! bounded pre-roll + post-roll clip around each distinct event.
//!
//! ## Architecture
//!
//! 1. FrameSource - local capture device or remote MJPEG feed
//! 2. ClipBuffer - ring window + detection state machine (the core)
//! 3. Sampler - every-Nth-frame classification loop
//! 4. DetectorClient - external classifier adapter
//! 5. ClipExporter - MP4 mux, representative still, re-encode
//! 6. ClipUploader - artifact handoff to the remote endpoint
//! 7. ControlGate - remote detection on/off, push-driven
//! 8. Pipeline - task lifecycle, supervisor, shutdown drain
//! 9. WebAPI - health/status + control push endpoints
//!
//! ## Design principles
//!
//! - One lock around the shared window, held only for O(window) copies
//! - Ingestion never blocks on disk, re-encoding or uploads
//! - One event in flight at a time; cooldown between event starts

pub mod auth;
pub mod clip_buffer;
pub mod control_gate;
pub mod detector;
pub mod error;
pub mod event_id;
pub mod exporter;
pub mod frame_source;
pub mod pipeline;
pub mod sampler;
pub mod state;
pub mod uploader;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
