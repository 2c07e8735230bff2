//! Clip exporter
//!
//! ## Responsibilities
//!
//! - Serialize a finished window to an MP4 container at fixed frame rate
//! - Capture the representative still at the trigger point
//! - Re-encode for bitrate normalization (non-fatal quality pass)
//!
//! Runs entirely on the snapshot copy after the buffer lock is released;
//! the engine keeps ingesting while this writes.

use crate::error::{Error, Result};
use crate::event_id::EventId;
use crate::frame_source::Frame;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Generous bound for a mux/re-encode pass; a clip is tens of seconds long
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(120);

/// Descriptor of one finished event artifact. Once this is handed to the
/// uploader the device's responsibility for the clip ends.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub event_id: EventId,
    pub file_path: PathBuf,
    pub representative_frame_path: Option<PathBuf>,
    pub frame_count: usize,
    pub created_at: DateTime<Utc>,
}

/// ClipExporter instance
pub struct ClipExporter {
    /// Directory for exported clips ({event_id}.mp4)
    video_dir: PathBuf,
    /// Directory for representative stills ({event_id}.jpg)
    image_dir: PathBuf,
    /// Container frame rate; matches the capture rate
    fps: u32,
    /// Frame index of the trigger point (end of pre-roll)
    still_index: usize,
    /// Target bitrate for the re-encode pass
    bitrate: String,
}

impl ClipExporter {
    pub async fn new(
        video_dir: PathBuf,
        image_dir: PathBuf,
        fps: u32,
        still_index: usize,
        bitrate: String,
    ) -> Result<Self> {
        fs::create_dir_all(&video_dir).await?;
        fs::create_dir_all(&image_dir).await?;

        Ok(Self {
            video_dir,
            image_dir,
            fps,
            still_index,
            bitrate,
        })
    }

    /// Write the ordered frame sequence to `{event_id}.mp4`, capture the
    /// representative still, then re-encode in place.
    pub async fn export(&self, frames: &[Frame], event_id: &EventId) -> Result<ExportArtifact> {
        if frames.is_empty() {
            return Err(Error::Export("empty window, nothing to export".to_string()));
        }

        let video_path = self.video_dir.join(format!("{}.mp4", event_id));
        let (width, height) = (frames[0].width, frames[0].height);

        tracing::info!(
            event_id = %event_id,
            frame_count = frames.len(),
            width = width,
            height = height,
            path = %video_path.display(),
            "Exporting clip"
        );

        let still_path = match self.write_still(frames, event_id).await {
            Ok(path) => Some(path),
            Err(e) => {
                // The still is a convenience for review; the clip is the
                // deliverable
                tracing::warn!(event_id = %event_id, error = %e, "Representative still failed");
                None
            }
        };

        self.mux(frames, &video_path).await?;

        if let Err(e) = self.re_encode(&video_path).await {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "Re-encode failed, keeping original file"
            );
        }

        Ok(ExportArtifact {
            event_id: event_id.clone(),
            file_path: video_path,
            representative_frame_path: still_path,
            frame_count: frames.len(),
            created_at: Utc::now(),
        })
    }

    /// Index of the frame saved as the representative still: the trigger
    /// point when the clip is full length, else the last frame available
    fn representative_index(&self, frame_count: usize) -> usize {
        self.still_index.min(frame_count - 1)
    }

    async fn write_still(&self, frames: &[Frame], event_id: &EventId) -> Result<PathBuf> {
        let index = self.representative_index(frames.len());
        let path = self.image_dir.join(format!("{}.jpg", event_id));
        fs::write(&path, &frames[index].data).await?;
        tracing::debug!(
            event_id = %event_id,
            frame_index = index,
            path = %path.display(),
            "Saved representative still"
        );
        Ok(path)
    }

    /// Pipe the JPEG sequence into ffmpeg as an image2pipe input
    async fn mux(&self, frames: &[Frame], video_path: &Path) -> Result<()> {
        let fps = self.fps.to_string();
        let mut child = Command::new("ffmpeg")
            .args([
                "-f", "image2pipe",
                "-framerate", &fps,
                "-i", "-",
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-loglevel", "error",
                "-y",
            ])
            .arg(video_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Export(format!("ffmpeg spawn failed: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Export("ffmpeg stdin not captured".to_string()))?;

        for frame in frames {
            stdin
                .write_all(&frame.data)
                .await
                .map_err(|e| Error::Export(format!("ffmpeg pipe write failed: {}", e)))?;
        }
        drop(stdin); // EOF so ffmpeg finalizes the container

        let output = tokio::time::timeout(FFMPEG_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Export(format!("ffmpeg mux timeout ({}s)", FFMPEG_TIMEOUT.as_secs())))?
            .map_err(|e| Error::Export(format!("ffmpeg execution failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Export(format!("ffmpeg mux failed: {}", stderr.trim())));
        }

        Ok(())
    }

    /// Bitrate-normalizing pass: encode to a temp file, then rename over
    /// the original on success
    async fn re_encode(&self, video_path: &Path) -> Result<()> {
        let mut tmp_path = video_path.as_os_str().to_owned();
        tmp_path.push(".tmp.mp4");
        let tmp_path = PathBuf::from(tmp_path);

        let child = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(video_path)
            .args(["-b:v", &self.bitrate, "-bufsize", &self.bitrate, "-loglevel", "error"])
            .arg(&tmp_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Export(format!("ffmpeg spawn failed: {}", e)))?;

        let result = tokio::time::timeout(FFMPEG_TIMEOUT, child.wait_with_output()).await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(Error::Export(format!("ffmpeg execution failed: {}", e)));
            }
            Err(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(Error::Export(format!(
                    "re-encode timeout ({}s)",
                    FFMPEG_TIMEOUT.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Export(format!(
                "re-encode failed: {}",
                stderr.trim()
            )));
        }

        fs::rename(&tmp_path, video_path).await?;
        tracing::debug!(
            path = %video_path.display(),
            bitrate = %self.bitrate,
            "Clip re-encoded"
        );
        Ok(())
    }

    /// Check ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Export(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Export("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }
}
