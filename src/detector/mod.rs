//! Detector adapter
//!
//! ## Responsibilities
//!
//! - Send sampled frames to the external classifier
//! - Parse the label set out of the response
//! - Reachability probe for the fatal startup check
//!
//! The classifier itself is an external collaborator; this adapter only
//! carries frames over and answers "does the result set qualify".

use crate::error::{Error, Result};
use crate::frame_source::Frame;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Reserved label marking an unrecognized subject; its presence in a result
/// set is the trigger condition.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Classification seam. The sampler is written against this trait so the
/// engine and its timing can be exercised without a live classifier.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, frame: &Frame) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Classification response: the set of recognized subject labels
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    labels: Vec<String>,
}

/// HTTP classifier client
pub struct DetectorClient {
    client: reqwest::Client,
    base_url: String,
}

impl DetectorClient {
    pub fn new(base_url: String) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Check classifier reachability
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Classifier for DetectorClient {
    async fn classify(&self, frame: &Frame) -> Result<Vec<String>> {
        let url = format!("{}/v1/classify", self.base_url);

        let form = Form::new().part(
            "image",
            Part::bytes(frame.data.to_vec())
                .file_name("sample.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Detector(format!(
                "classifier returned {}",
                resp.status()
            )));
        }

        let result: ClassifyResponse = resp.json().await?;
        Ok(result.labels)
    }
}

/// Whether a label set contains the trigger condition
pub fn qualifies(labels: &[String]) -> bool {
    labels.iter().any(|l| l == UNKNOWN_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifies_on_unknown_label() {
        let labels = vec!["alice".to_string(), "Unknown".to_string()];
        assert!(qualifies(&labels));

        let labels = vec!["alice".to_string(), "bob".to_string()];
        assert!(!qualifies(&labels));

        assert!(!qualifies(&[]));
    }

    #[test]
    fn test_qualifies_is_case_sensitive() {
        // "unknown" is a legitimate subject name; only the reserved label
        // spelling triggers
        let labels = vec!["unknown".to_string()];
        assert!(!qualifies(&labels));
    }

    #[test]
    fn test_classify_response_parsing() {
        let json = r#"{"labels": ["alice", "Unknown"]}"#;
        let resp: ClassifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.labels.len(), 2);

        // Labels field absent means nothing recognized
        let resp: ClassifyResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.labels.is_empty());
    }
}
