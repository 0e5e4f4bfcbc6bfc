//! Error taxonomy and its HTTP mapping.
//!
//! `Display` carries the diagnostic detail that goes to the logs; `user_message`
//! is the short text sent back to the caller.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("invalid value {value:?} for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: String },

    #[error("not an accepted source URL: {0}")]
    InvalidSource(String),

    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}")]
    ProcessNonZeroExit { program: String, code: Option<i32> },

    #[error("{program} timed out after {after:?}")]
    ProcessTimeout { program: String, after: Duration },

    #[error("unparseable extraction output: {0}")]
    UnparseableOutput(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching {url} failed: {reason}")]
    RemoteFetch { url: String, reason: String },

    #[error("{url} answered with status {status}")]
    UpstreamRejected { url: String, status: u16 },

    #[error("{url} has content-type {content_type:?}, expected an image")]
    UnsupportedContentType {
        url: String,
        content_type: Option<String>,
    },

    #[error("relay of {url} interrupted: {reason}")]
    RelayInterrupted { url: String, reason: String },
}

impl AppError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::MissingParameter(_)
            | AppError::InvalidParameter { .. }
            | AppError::InvalidSource(_)
            | AppError::UpstreamRejected { .. }
            | AppError::UnsupportedContentType { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, caller-facing text. Details belong in logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::MissingParameter("url") => "No URL provided".to_string(),
            AppError::MissingParameter(name) => format!("Missing required parameter: {name}"),
            AppError::InvalidParameter { name, .. } => format!("Invalid value for parameter: {name}"),
            AppError::InvalidSource(_) => "Invalid YouTube URL".to_string(),
            AppError::ProcessSpawn { .. } => "Extraction tool is not available".to_string(),
            AppError::ProcessNonZeroExit { .. } => "Failed to fetch video info".to_string(),
            AppError::ProcessTimeout { .. } => "Timed out fetching video info".to_string(),
            AppError::UnparseableOutput(_) => "Error reading video info".to_string(),
            AppError::Io { .. } => "An unknown error occurred".to_string(),
            AppError::RemoteFetch { .. } => "Failed to fetch the requested resource".to_string(),
            AppError::UpstreamRejected { .. } => "The requested resource is unavailable".to_string(),
            AppError::UnsupportedContentType { .. } => "The URL does not point to an image".to_string(),
            AppError::RelayInterrupted { .. } => "Transfer interrupted".to_string(),
        }
    }
}

/// Wrapper so handlers can return `Result<T, ApiError>` directly.
///
/// The JSON body is `{ "<key>": <user message> }` where the key defaults to
/// `error`; the download endpoint answers with `message` instead.
#[derive(Debug)]
pub struct ApiError {
    inner: AppError,
    body_key: &'static str,
}

impl ApiError {
    pub fn new(inner: AppError) -> Self {
        Self {
            inner,
            body_key: "error",
        }
    }

    pub fn with_message_key(mut self) -> Self {
        self.body_key = "message";
        self
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.inner.http_status();

        if status.is_server_error() {
            log::error!("Request failed ({}): {}", status, self.inner);
        } else {
            log::warn!("Request rejected ({}): {}", status, self.inner);
        }

        let mut body = serde_json::Map::new();
        body.insert(self.body_key.to_string(), json!(self.inner.user_message()));

        (status, axum::Json(serde_json::Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_before_external_calls_are_bad_requests() {
        assert_eq!(
            AppError::MissingParameter("url").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidSource("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UnsupportedContentType {
                url: "https://a/b".into(),
                content_type: Some("text/html".into()),
            }
            .http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn process_failures_are_server_errors() {
        let err = AppError::ProcessNonZeroExit {
            program: "yt-dlp".into(),
            code: Some(1),
        };
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "yt-dlp exited with status Some(1)");
        assert_eq!(err.user_message(), "Failed to fetch video info");
    }

    #[test]
    fn missing_url_has_its_own_message() {
        assert_eq!(
            AppError::MissingParameter("url").user_message(),
            "No URL provided"
        );
        assert_eq!(
            AppError::MissingParameter("quality").user_message(),
            "Missing required parameter: quality"
        );
        assert_ne!(
            AppError::MissingParameter("url").user_message(),
            AppError::InvalidSource("nope".into()).user_message()
        );
    }

    #[test]
    fn message_key_is_switchable() {
        let err = ApiError::new(AppError::MissingParameter("extension")).with_message_key();
        assert_eq!(err.body_key, "message");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
