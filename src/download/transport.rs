//! Download transports.
//!
//! [`BufferedTransport`] goes through the [`ApiClient`] so interceptors,
//! status policies and notifications apply. [`StreamingTransport`] talks to
//! the network directly and reads the body chunk by chunk so it can report
//! progress; it only shares the base URL and bearer token with the facade.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT, MAX_PREALLOCATION, READ_TIMEOUT};
use super::error::DownloadError;
use super::filename::extract_filename;
use super::progress::DownloadProgress;
use crate::api::{ApiClient, RequestOptions};
use crate::auth::Session;
use crate::user_agent;

/// Progress callback invoked after each received chunk.
pub type ProgressFn = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// HTTP method for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMethod {
    #[default]
    Get,
    Post,
}

impl DownloadMethod {
    fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
        }
    }
}

impl fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

impl FromStr for DownloadMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(format!("unsupported download method '{other}' (expected GET or POST)")),
        }
    }
}

/// What to fetch.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    /// Absolute URL, or a path relative to the API base URL.
    pub url: String,
    pub method: DownloadMethod,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

/// Fetched file contents and the filename derived from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A way of fetching a file.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether `fetch` reports progress through the callback.
    fn supports_progress(&self) -> bool;

    /// Fetches the whole body.
    async fn fetch(
        &self,
        request: &DownloadRequest,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadedFile, DownloadError>;
}

/// Fetches through the API client facade as a binary response.
#[derive(Debug, Clone)]
pub struct BufferedTransport {
    client: ApiClient,
}

impl BufferedTransport {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for BufferedTransport {
    fn supports_progress(&self) -> bool {
        false
    }

    #[instrument(skip(self, request, _on_progress), fields(url = %request.url))]
    async fn fetch(
        &self,
        request: &DownloadRequest,
        _on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadedFile, DownloadError> {
        let mut options = RequestOptions::method(request.method.as_method())
            .with_queries(request.query.iter().cloned());
        if let Some(body) = &request.body {
            options = options.with_body(body.clone());
        }

        let response = self
            .client
            .fetch_bytes(&request.url, &options)
            .await
            .map_err(DownloadError::api)?;

        let filename = extract_filename(content_disposition(&response.headers), &request.url);
        debug!(filename = %filename, bytes = response.bytes.len(), "buffered download complete");
        Ok(DownloadedFile {
            bytes: response.bytes,
            filename,
        })
    }
}

/// Streams the body directly from the network, bypassing the facade.
#[derive(Debug, Clone)]
pub struct StreamingTransport {
    http: Client,
    base_url: String,
    session: Arc<Session>,
}

impl StreamingTransport {
    /// Creates a streaming transport for relative URLs under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Build`] when the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> Result<Self, DownloadError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .user_agent(user_agent::default_client_user_agent())
            .build()
            .map_err(DownloadError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            session,
        })
    }

    /// Shares base URL and session with an existing API client.
    ///
    /// # Errors
    ///
    /// See [`StreamingTransport::new`].
    pub fn for_client(client: &ApiClient) -> Result<Self, DownloadError> {
        Self::new(client.base_url(), Arc::clone(client.session()))
    }
}

#[async_trait]
impl Transport for StreamingTransport {
    fn supports_progress(&self) -> bool {
        true
    }

    #[instrument(skip(self, request, on_progress), fields(url = %request.url))]
    async fn fetch(
        &self,
        request: &DownloadRequest,
        on_progress: Option<&ProgressFn>,
    ) -> Result<DownloadedFile, DownloadError> {
        let url = full_url(&self.base_url, &request.url, &request.query);
        let parsed = Url::parse(&url).map_err(|_| DownloadError::invalid_url(&url))?;

        let mut builder = self.http.request(request.method.as_method(), parsed);
        if let Some(bearer) = self.session.bearer_header() {
            builder = builder.header(AUTHORIZATION, bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DownloadError::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(&url, status.as_u16()));
        }

        let filename = extract_filename(content_disposition(response.headers()), &request.url);
        let total = content_length(response.headers());
        debug!(filename = %filename, total = ?total, "streaming download started");

        let capacity = total.unwrap_or(0).min(MAX_PREALLOCATION);
        let mut bytes = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        let mut loaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::network(&url, e))?;
            bytes.extend_from_slice(&chunk);
            loaded += chunk.len() as u64;

            if let Some(callback) = on_progress
                && let Some(progress) = total.and_then(|t| DownloadProgress::new(loaded, t))
            {
                callback(progress);
            }
        }

        debug!(bytes = loaded, "streaming download complete");
        Ok(DownloadedFile { bytes, filename })
    }
}

/// Absolute URLs pass through; others are prefixed with `base`. Query pairs
/// are appended with `?` or `&` depending on whether the URL already has a query.
pub(crate) fn full_url(base: &str, url: &str, query: &[(String, String)]) -> String {
    let mut full = if crate::api::is_absolute_url(url) {
        url.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    };

    if !query.is_empty() {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        full.push(if full.contains('?') { '&' } else { '?' });
        full.push_str(&encoded);
    }
    full
}

fn content_disposition(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
}

/// Positive `Content-Length`, if announced.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|len| *len > 0)
}
