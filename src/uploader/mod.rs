//! Clip uploader
//!
//! ## Responsibilities
//!
//! - Transmit finished artifacts to the remote endpoint
//! - Carry the device identity, event id and event timestamp with each file
//!
//! Durability passes to the remote side once the upload succeeds; the
//! device keeps the local files only as a best-effort cache. An access
//! denial is surfaced, never retried with the same credentials - fresh
//! tokens are the auth collaborator's job.

use crate::error::{Error, Result};
use crate::event_id::EventId;
use crate::exporter::ExportArtifact;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// ClipUploader instance
pub struct ClipUploader {
    client: reqwest::Client,
    upload_url: String,
    device_id: String,
    device_location: String,
}

impl ClipUploader {
    pub fn new(upload_url: String, device_id: String, device_location: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            upload_url,
            device_id,
            device_location,
        }
    }

    /// Upload the clip, then the representative still if one was captured.
    ///
    /// A failed still upload is a warning; the clip is the deliverable.
    pub async fn upload_artifact(&self, artifact: &ExportArtifact, token: &str) -> Result<()> {
        self.upload_file(&artifact.file_path, &artifact.event_id, "video/mp4", token)
            .await?;

        if let Some(ref still) = artifact.representative_frame_path {
            if let Err(e) = self
                .upload_file(still, &artifact.event_id, "image/jpeg", token)
                .await
            {
                tracing::warn!(
                    event_id = %artifact.event_id,
                    error = %e,
                    "Representative still upload failed"
                );
            }
        }

        tracing::info!(
            event_id = %artifact.event_id,
            frame_count = artifact.frame_count,
            "Artifact uploaded"
        );
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        event_id: &EventId,
        mime: &str,
        token: &str,
    ) -> Result<()> {
        let data = fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| event_id.to_string());

        let form = Form::new().part(
            "file",
            Part::bytes(data).file_name(file_name).mime_str(mime)?,
        );

        let resp = self
            .client
            .post(&self.upload_url)
            .bearer_auth(token)
            .header("deviceid", &self.device_id)
            .header("devicelocation", &self.device_location)
            .header("eventid", event_id.as_str())
            .header("timesent", Self::time_sent(event_id))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!(
                "upload rejected token: {}",
                status
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upload(format!("upload failed: {} - {}", status, body)));
        }

        tracing::debug!(
            event_id = %event_id,
            path = %path.display(),
            "File uploaded"
        );
        Ok(())
    }

    /// ISO-8601 event timestamp: derived from the event id, falling back to
    /// the wall clock if the id does not carry one
    fn time_sent(event_id: &EventId) -> String {
        event_id
            .timestamp()
            .unwrap_or_else(Utc::now)
            .to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_sent_comes_from_event_id() {
        let when = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let event_id = EventId::at(when);
        assert_eq!(ClipUploader::time_sent(&event_id), when.to_rfc3339());
    }
}
