//! Error types for the download module.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::{ApiClientError, ParsedError, friendly_error_message};

/// Errors that can occur during file downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx response on the streaming path.
    #[error("HTTP {status} {status_text} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Canonical reason phrase, empty when unknown.
        status_text: String,
    },

    /// File system error while saving (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The streaming HTTP client could not be constructed.
    #[error("failed to build download client: {0}")]
    Build(#[source] reqwest::Error),

    /// Failure on the buffered path, which goes through the API client.
    #[error(transparent)]
    Api(ApiClientError),
}

impl DownloadError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error with the canonical reason phrase.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self::HttpStatus {
            url: url.into(),
            status,
            status_text,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Wraps an API client error from the buffered transport.
    #[must_use]
    pub fn api(source: ApiClientError) -> Self {
        Self::Api(source)
    }

    /// Returns the HTTP status for status errors on either path.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Api(inner) => inner.status(),
            _ => None,
        }
    }
}

impl From<&DownloadError> for ParsedError {
    fn from(error: &DownloadError) -> Self {
        match error {
            DownloadError::Api(inner) => ParsedError::from(inner),
            DownloadError::HttpStatus { status, .. } => Self {
                message: friendly_error_message(Some(*status), Some(&error.to_string())),
                status: Some(*status),
                details: None,
            },
            other => Self {
                message: other.to_string(),
                ..Self::default()
            },
        }
    }
}
