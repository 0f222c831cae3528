//! Proxy error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;

use crate::api::ApiResponse;

/// Errors raised while configuring or running the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The configured upstream is not an absolute http(s) URL.
    #[error("invalid upstream URL: {url}")]
    InvalidUpstream { url: String },

    /// The route prefix is empty or `/`.
    #[error("invalid proxy prefix '{prefix}': must be a non-root path such as /api")]
    InvalidPrefix { prefix: String },

    /// The inbound request body could not be read.
    #[error("failed to read request body: {source}")]
    RequestBody {
        #[source]
        source: axum::Error,
    },

    /// The upstream could not be reached or aborted the exchange.
    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Listener or server loop failure.
    #[error("proxy server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl ProxyError {
    pub fn invalid_upstream(url: impl Into<String>) -> Self {
        Self::InvalidUpstream { url: url.into() }
    }

    pub fn invalid_prefix(prefix: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
        }
    }

    pub fn upstream(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Upstream {
            url: url.into(),
            source,
        }
    }

    /// HTTP status answered to the client for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RequestBody { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::InvalidUpstream { .. }
            | Self::InvalidPrefix { .. }
            | Self::Build(_)
            | Self::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse {
            code: i64::from(status.as_u16()),
            data: Value::Null,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
