//! Remote MJPEG feed over a long-lived HTTP response

use super::mjpeg::JpegScanner;
use super::Frame;
use crate::error::{Error, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;

/// Remote frame source: a long-lived GET whose body is a concatenated
/// sequence of JPEG-delimited chunks. Every read carries the caller's
/// bearer token; a 401/403 on connect surfaces as access denied and is not
/// retried with the same credentials.
pub struct HttpStreamSource {
    client: reqwest::Client,
    stream_url: String,
    token: String,
    body: Option<BoxStream<'static, reqwest::Result<bytes::Bytes>>>,
    scanner: JpegScanner,
}

impl HttpStreamSource {
    pub fn new(stream_url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            stream_url,
            token,
            body: None,
            scanner: JpegScanner::new(),
        }
    }

    /// Open the long-lived response. Called lazily on the first
    /// `next_frame` and again by the capture task after a stream drop.
    async fn connect(&mut self) -> Result<()> {
        let resp = self
            .client
            .get(&self.stream_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Stream(format!("connect to {} failed: {}", self.stream_url, e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!(
                "frame stream rejected token: {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(Error::Stream(format!("frame stream returned {}", status)));
        }

        tracing::info!(url = %self.stream_url, "Frame stream connected");
        self.body = Some(resp.bytes_stream().boxed());
        self.scanner = JpegScanner::new();
        Ok(())
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.body.is_none() {
            self.connect().await?;
        }

        loop {
            // Drain frames already buffered before pulling the next chunk
            while let Some(jpg) = self.scanner.next_jpeg() {
                if let Some(frame) = Frame::decode(jpg) {
                    return Ok(Some(frame));
                }
            }

            let body = self.body.as_mut().ok_or_else(|| {
                Error::Stream("frame stream not connected".to_string())
            })?;

            match body.next().await {
                Some(Ok(chunk)) => self.scanner.push(&chunk),
                Some(Err(e)) => {
                    self.body = None;
                    return Err(Error::Stream(format!("frame stream read failed: {}", e)));
                }
                None => {
                    tracing::info!(url = %self.stream_url, "Frame stream ended");
                    self.body = None;
                    return Ok(None);
                }
            }
        }
    }
}
