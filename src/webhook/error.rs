//! Webhook error types.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised by the deployment webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing or mismatching signature.
    #[error("signature verification failed")]
    Unauthorized,

    /// The payload is not valid JSON.
    #[error("invalid payload: {reason}")]
    BadRequest { reason: String },

    #[error("invalid HMAC key: {0}")]
    Key(#[source] hmac::digest::InvalidLength),

    /// The deploy script could not be started.
    #[error("failed to run deploy script {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deploy script exited unsuccessfully.
    #[error("deploy script {path} failed with exit code {code:?}")]
    DeployFailed { path: PathBuf, code: Option<i32> },

    /// Listener or server loop failure.
    #[error("webhook server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl WebhookError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Key(_) | Self::Spawn { .. } | Self::DeployFailed { .. } | Self::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Plain-text reason phrase only; details stay in the server log.
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body.to_string()).into_response()
    }
}
