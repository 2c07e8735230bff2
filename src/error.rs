//! Error handling for the clip recorder

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Config error (fatal at startup - the pipeline refuses to arm)
    #[error("Config error: {0}")]
    Config(String),

    /// Unauthorized (stream or upload access denied)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Frame stream error (upstream drop, connect failure)
    #[error("Stream error: {0}")]
    Stream(String),

    /// Detector error
    #[error("Detector error: {0}")]
    Detector(String),

    /// Export error
    #[error("Export error: {0}")]
    Export(String),

    /// Upload error
    #[error("Upload error: {0}")]
    Upload(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            Error::Stream(msg) => (StatusCode::BAD_GATEWAY, "STREAM_ERROR", msg.clone()),
            Error::Detector(msg) => (StatusCode::BAD_GATEWAY, "DETECTOR_ERROR", msg.clone()),
            Error::Export(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "EXPORT_ERROR",
                msg.clone(),
            ),
            Error::Upload(msg) => (StatusCode::BAD_GATEWAY, "UPLOAD_ERROR", msg.clone()),
            Error::Parse(msg) => (StatusCode::BAD_REQUEST, "PARSE_ERROR", msg.clone()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
