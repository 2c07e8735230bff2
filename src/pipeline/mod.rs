//! Recording pipeline lifecycle
//!
//! ## Responsibilities
//!
//! - Fatal startup checks (config validation, classifier reachability)
//! - Spawn and own the capture task, the sampler and the export worker
//! - Bounded-join shutdown with best-effort drain of in-flight flushes
//! - Start/stop pipelines on control gate events
//!
//! All lifecycle state lives in the `PipelineHandle` returned by `start()`
//! and consumed by `stop()`; there are no process-wide running flags.

use crate::auth::AuthSession;
use crate::clip_buffer::{ClipBuffer, FlushJob};
use crate::detector::DetectorClient;
use crate::error::{Error, Result};
use crate::exporter::ClipExporter;
use crate::frame_source::{FrameSource, HttpStreamSource, LocalCaptureSource, VideoSource};
use crate::sampler::{self, SamplerHandle};
use crate::state::AppConfig;
use crate::uploader::ClipUploader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

/// Delay before reconnecting a dropped frame source
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Bounded join timeout for the capture task
const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Drain timeout for the export worker; an in-flight export/upload is
/// allowed to finish rather than aborted mid-write
const EXPORT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// In-flight flush bound. Cooldown spaces events further apart than an
/// export takes, so one slot of slack is plenty; a full channel is the
/// non-fatal "flush failed" path.
const FLUSH_CHANNEL_CAPACITY: usize = 2;

/// Recorder state snapshot for the status endpoint
pub struct RecorderStatus {
    running: AtomicBool,
    buffer: RwLock<Option<Arc<ClipBuffer>>>,
}

impl RecorderStatus {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            buffer: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn is_armed(&self) -> bool {
        match self.buffer.read().await.as_ref() {
            Some(buffer) => buffer.is_armed().await,
            None => false,
        }
    }

    pub async fn window_len(&self) -> usize {
        match self.buffer.read().await.as_ref() {
            Some(buffer) => buffer.window_len().await,
            None => 0,
        }
    }

    async fn attach(&self, buffer: Arc<ClipBuffer>) {
        *self.buffer.write().await = Some(buffer);
        self.running.store(true, Ordering::SeqCst);
    }

    async fn detach(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.buffer.write().await = None;
    }
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to start (and restart) a recording pipeline
pub struct Pipeline {
    config: AppConfig,
    detector: Arc<DetectorClient>,
    exporter: Arc<ClipExporter>,
    uploader: Arc<ClipUploader>,
    session: AuthSession,
    status: Arc<RecorderStatus>,
}

/// Handle to one running pipeline: cancellation plus join handles
pub struct PipelineHandle {
    shutdown: watch::Sender<bool>,
    capture: JoinHandle<()>,
    sampler: SamplerHandle,
    export_worker: JoinHandle<()>,
    buffer: Arc<ClipBuffer>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        detector: Arc<DetectorClient>,
        exporter: Arc<ClipExporter>,
        uploader: Arc<ClipUploader>,
        session: AuthSession,
        status: Arc<RecorderStatus>,
    ) -> Self {
        Self {
            config,
            detector,
            exporter,
            uploader,
            session,
            status,
        }
    }

    /// Start a fresh pipeline: fatal checks, then spawn capture, sampler
    /// and export worker.
    pub async fn start(&self) -> Result<PipelineHandle> {
        self.config.buffer.validate()?;
        if !self.detector.health_check().await? {
            return Err(Error::Config(format!(
                "classifier unreachable at {}",
                self.detector.base_url()
            )));
        }

        let (flush_tx, flush_rx) = mpsc::channel(FLUSH_CHANNEL_CAPACITY);
        let buffer = Arc::new(ClipBuffer::new(self.config.buffer.clone(), flush_tx)?);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let capture = tokio::spawn(run_capture(
            self.make_source(),
            buffer.clone(),
            shutdown_rx,
        ));
        let sampler = sampler::start(
            buffer.clone(),
            self.detector.clone(),
            self.config.detect_every_n,
        );
        let export_worker = tokio::spawn(run_export_worker(
            flush_rx,
            self.exporter.clone(),
            self.uploader.clone(),
            self.session.id_token.clone(),
        ));

        self.status.attach(buffer.clone()).await;
        tracing::info!(
            pre_roll_frames = self.config.buffer.pre_roll_capacity(),
            total_frames = self.config.buffer.total_capacity(),
            detect_every_n = self.config.detect_every_n,
            "Recording pipeline started"
        );

        Ok(PipelineHandle {
            shutdown,
            capture,
            sampler,
            export_worker,
            buffer,
        })
    }

    fn make_source(&self) -> VideoSource {
        match self.config.video_device {
            Some(ref device) => VideoSource::Local(LocalCaptureSource::new(
                device.clone(),
                self.config.buffer.fps,
            )),
            None => VideoSource::Remote(HttpStreamSource::new(
                self.config.stream_url.clone(),
                self.session.id_token.clone(),
            )),
        }
    }
}

impl PipelineHandle {
    /// Stop the pipeline: signal, bounded joins, then drain the export
    /// worker. A window that never armed is discarded, not flushed.
    pub async fn stop(self, status: &RecorderStatus) {
        let _ = self.shutdown.send(true);

        if tokio::time::timeout(CAPTURE_STOP_TIMEOUT, self.capture)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = CAPTURE_STOP_TIMEOUT.as_secs(),
                "Capture task still blocked on upstream read, abandoning it"
            );
        }
        self.sampler.stop().await;

        status.detach().await;

        // Dropping the last engine reference closes the flush channel; the
        // worker finishes whatever is already queued and exits.
        drop(self.buffer);
        if tokio::time::timeout(EXPORT_DRAIN_TIMEOUT, self.export_worker)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = EXPORT_DRAIN_TIMEOUT.as_secs(),
                "Export worker still draining, abandoning it"
            );
        }

        tracing::info!("Recording pipeline stopped");
    }
}

/// Capture loop: pull frames and ingest them, reconnecting the source on
/// transient failures. The engine stays frozen in its current state while
/// the source is down.
async fn run_capture<S: FrameSource>(
    mut source: S,
    buffer: Arc<ClipBuffer>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            result = source.next_frame() => match result {
                Ok(Some(frame)) => {
                    buffer.ingest(frame).await;
                }
                Ok(None) => {
                    tracing::info!(
                        delay_secs = RECONNECT_DELAY.as_secs(),
                        "Frame source ended, reconnecting"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(Error::Unauthorized(msg)) => {
                    // A stale token will not become valid by retrying; a
                    // fresh one arrives with the next pipeline start
                    tracing::error!(error = %msg, "Frame source access denied, capture stopped");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        delay_secs = RECONNECT_DELAY.as_secs(),
                        "Frame source error, reconnecting"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    tracing::debug!("Capture loop exited");
}

/// Export worker: receives finished windows and turns them into uploaded
/// artifacts. Failures here never reach the engine - the window was
/// already cleared when the job was handed over.
async fn run_export_worker(
    mut flush_rx: mpsc::Receiver<FlushJob>,
    exporter: Arc<ClipExporter>,
    uploader: Arc<ClipUploader>,
    token: String,
) {
    while let Some(job) = flush_rx.recv().await {
        match exporter.export(&job.frames, &job.event_id).await {
            Ok(artifact) => {
                if let Err(e) = uploader.upload_artifact(&artifact, &token).await {
                    tracing::warn!(
                        event_id = %artifact.event_id,
                        path = %artifact.file_path.display(),
                        error = %e,
                        "Upload failed, artifact kept on disk"
                    );
                }
            }
            Err(e) => {
                tracing::error!(event_id = %job.event_id, error = %e, "Export failed");
            }
        }
    }

    tracing::debug!("Export worker exited");
}

/// Control supervisor: blocks on the gate channel and starts/stops the
/// pipeline on flag transitions. Repeated values are ignored so a re-sent
/// flag never restarts a healthy pipeline.
pub async fn run_supervisor(
    pipeline: Pipeline,
    mut gate_rx: mpsc::Receiver<bool>,
    status: Arc<RecorderStatus>,
) {
    let mut handle: Option<PipelineHandle> = None;

    while let Some(enabled) = gate_rx.recv().await {
        if enabled {
            if handle.is_some() {
                tracing::debug!("Detection already enabled");
                continue;
            }
            match pipeline.start().await {
                Ok(h) => handle = Some(h),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start recording pipeline");
                }
            }
        } else if let Some(h) = handle.take() {
            tracing::info!("Detection disabled, stopping recording pipeline");
            h.stop(&status).await;
        } else {
            tracing::debug!("Detection already disabled");
        }
    }

    // Gate gone (process shutdown): drain any running pipeline
    if let Some(h) = handle.take() {
        h.stop(&status).await;
    }
    tracing::info!("Control supervisor exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recorder_status_defaults() {
        let status = RecorderStatus::new();
        assert!(!status.is_running());
        assert!(!status.is_armed().await);
        assert_eq!(status.window_len().await, 0);
    }
}
