//! Error types for edge-api

use thiserror::Error;

/// Result type alias using edge-api Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local file could not be read (uploads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// Response had no usable body
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// File type the backend cannot index
    #[error("unsupported file type '{0}' (expected .pdf or .txt)")]
    UnsupportedFileType(String),

    /// Invalid configuration (bad base URL, missing filename)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a status error from a failed response, consuming its body.
    pub async fn from_response(endpoint: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status {
            endpoint,
            status,
            body,
        }
    }

    /// Whether the backend could not be reached at all (as opposed to answering badly).
    pub fn is_unreachable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let e = Error::Status {
            endpoint: "/chat",
            status: 503,
            body: "model loading".into(),
        };
        assert_eq!(e.to_string(), "/chat returned 503: model loading");
        assert!(!e.is_unreachable());
    }

    #[test]
    fn test_non_http_errors_are_not_unreachable() {
        assert!(!Error::UnexpectedResponse("empty".into()).is_unreachable());
        assert!(!Error::InvalidConfig("bad url".into()).is_unreachable());
    }
}
