//! Error types for the API client.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur while talking to the site API.
#[derive(Debug, Error)]
pub enum ApiClientError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// `message` from the error body, if any.
        message: Option<String>,
        /// `details` from the error body, if any.
        details: Option<Map<String, Value>>,
    },

    /// 2xx response whose envelope `code` signals a business error.
    ///
    /// Only produced for requests made in strict mode.
    #[error("business error {code} requesting {url}: {message}")]
    Business {
        url: String,
        code: i64,
        message: String,
    },

    /// Response body was not valid JSON or did not match the requested type.
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be serialized to JSON.
    #[error("could not encode request body for {url}: {source}")]
    Encode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request path or base URL could not be turned into a URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ApiClientError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error without body details.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            message: None,
            details: None,
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status for status errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for failures that never reached an HTTP response.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Flattened view of an error for user-facing display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedError {
    pub message: String,
    pub status: Option<u16>,
    pub details: Option<Map<String, Value>>,
}

impl From<&ApiClientError> for ParsedError {
    fn from(error: &ApiClientError) -> Self {
        match error {
            ApiClientError::HttpStatus {
                status,
                message,
                details,
                ..
            } => Self {
                message: message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| error.to_string()),
                status: Some(*status),
                details: details.clone(),
            },
            ApiClientError::Business { message, .. } if !message.is_empty() => Self {
                message: message.clone(),
                ..Self::default()
            },
            other => Self {
                message: other.to_string(),
                ..Self::default()
            },
        }
    }
}

/// Extracts message, status, and details from a client error.
#[must_use]
pub fn parse_error(error: &ApiClientError) -> ParsedError {
    ParsedError::from(error)
}
