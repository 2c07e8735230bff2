//! Local capture device read through an ffmpeg MJPEG pipe

use super::mjpeg::JpegScanner;
use super::Frame;
use crate::error::{Error, Result};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const READ_CHUNK: usize = 16 * 1024;

/// Local frame source: ffmpeg reads the capture device and writes an MJPEG
/// stream to stdout, which goes through the same scanner as the remote feed.
///
/// kill_on_drop ensures the ffmpeg process dies with the source, so a
/// stopped pipeline never leaks a capture process holding the device open.
pub struct LocalCaptureSource {
    device: String,
    fps: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    scanner: JpegScanner,
    read_buf: Vec<u8>,
}

impl LocalCaptureSource {
    pub fn new(device: String, fps: u32) -> Self {
        Self {
            device,
            fps,
            child: None,
            stdout: None,
            scanner: JpegScanner::new(),
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let fps = self.fps.to_string();
        let mut child = Command::new("ffmpeg")
            .args([
                "-f", "v4l2",
                "-framerate", &fps,
                "-i", &self.device,
                "-f", "mjpeg",
                "-q:v", "5",
                "-loglevel", "error",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stream(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("ffmpeg stdout not captured".to_string()))?;

        tracing::info!(device = %self.device, fps = self.fps, "Local capture started");
        self.child = Some(child);
        self.stdout = Some(stdout);
        self.scanner = JpegScanner::new();
        Ok(())
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.stdout.is_none() {
            self.spawn()?;
        }

        loop {
            while let Some(jpg) = self.scanner.next_jpeg() {
                if let Some(frame) = Frame::decode(jpg) {
                    return Ok(Some(frame));
                }
            }

            let stdout = self.stdout.as_mut().ok_or_else(|| {
                Error::Stream("capture process not running".to_string())
            })?;

            match stdout.read(&mut self.read_buf).await {
                Ok(0) => {
                    tracing::warn!(device = %self.device, "Capture process closed its pipe");
                    self.stdout = None;
                    self.child = None;
                    return Ok(None);
                }
                Ok(n) => {
                    let chunk = self.read_buf[..n].to_vec();
                    self.scanner.push(&chunk);
                }
                Err(e) => {
                    self.stdout = None;
                    self.child = None;
                    return Err(Error::Stream(format!("capture pipe read failed: {}", e)));
                }
            }
        }
    }
}
