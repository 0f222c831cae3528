//! Portal Core Library
//!
//! This library provides the client-side plumbing and gateway services for
//! the company website: a configured API client that speaks the
//! `{code, data, message}` envelope, a download pipeline with progress
//! reporting, toast notifications, theme persistence, and the server-side
//! reverse proxy and deployment webhook.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - HTTP client facade, envelope unwrapping, status policies
//! - [`auth`] - Bearer token and post-login redirect state
//! - [`download`] - Buffered and streaming downloads, filename extraction
//! - [`notify`] - Toast notification service
//! - [`theme`] - Light/dark/system theme management
//! - [`retry`] - Fixed-delay retry wrapper and task runner
//! - [`failure`] - Bounded error log and panic reporting
//! - [`proxy`] - Reverse proxy route forwarding to the upstream API
//! - [`webhook`] - Signed deployment webhook listener
//! - [`config`] - Environment-driven configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod download;
pub mod failure;
pub mod notify;
pub mod proxy;
pub mod retry;
#[cfg(test)]
pub mod test_support;
pub mod theme;
pub(crate) mod user_agent;
pub mod webhook;

// Re-export commonly used types
pub use api::{
    ApiClient, ApiClientError, ApiErrorBody, ApiResponse, BinaryResponse, PaginatedData, PaginationParams,
    ParsedError, RequestOptions, SortOrder, StatusPolicy, friendly_error_message, parse_error,
    policy_for, unwrap_envelope,
};
pub use auth::{LOGIN_PATH, Session};
pub use config::{AppConfig, ConfigError, WebhookSettings};
pub use download::{
    BufferedTransport, DownloadError, DownloadMethod, DownloadOptions, DownloadOutcome,
    DownloadProgress, DownloadRequest, DownloadState, DownloadTracker, DownloadedFile, Downloader,
    StreamingTransport, Transport, extract_filename,
};
pub use failure::{ErrorContext, ErrorReport, ErrorReporter, ErrorSource};
pub use notify::{NotificationService, ToastKind, ToastMessage, ToastOptions};
pub use proxy::{ProxyConfig, ProxyError, ProxyState, ProxyTarget};
pub use retry::{RetryDecision, RetryPolicy, TaskReport, TaskRunner, retry_with_delay};
pub use theme::{
    Appearance, FileThemeBackend, ServerThemeBackend, Subscription, SystemAppearance, Theme,
    ThemeBackend, ThemeError, ThemeManager,
};
pub use webhook::{Deployer, ScriptDeployer, WebhookConfig, WebhookError, WebhookState};
