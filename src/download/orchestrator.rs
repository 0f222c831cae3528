//! Download orchestration: guard, transport choice, save, callbacks.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::error::DownloadError;
use super::save::{DirectorySink, Sink};
use super::transport::{
    BufferedTransport, DownloadMethod, DownloadRequest, ProgressFn, StreamingTransport, Transport,
};
use crate::api::{ApiClient, ParsedError};

/// Returns `false` to cancel a download before it starts.
pub type BeforeFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Called with the final filename after a successful save.
pub type SuccessFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Called once with the error of a failed download.
pub type ErrorFn = Arc<dyn Fn(&DownloadError) + Send + Sync>;

/// Per-download options.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Overrides the filename derived from the response.
    pub filename: Option<String>,
    pub method: DownloadMethod,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// Setting this selects the streaming transport.
    pub on_progress: Option<ProgressFn>,
    pub on_before: Option<BeforeFn>,
    pub on_success: Option<SuccessFn>,
    pub on_error: Option<ErrorFn>,
}

impl DownloadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn method(mut self, method: DownloadMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.on_progress = Some(callback);
        self
    }

    #[must_use]
    pub fn on_before(mut self, callback: BeforeFn) -> Self {
        self.on_before = Some(callback);
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: SuccessFn) -> Self {
        self.on_success = Some(callback);
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: ErrorFn) -> Self {
        self.on_error = Some(callback);
        self
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("filename", &self.filename)
            .field("method", &self.method)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_before", &self.on_before.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Result of [`Downloader::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved {
        path: PathBuf,
        filename: String,
        bytes: u64,
    },
    /// The `on_before` guard declined.
    Cancelled,
}

/// Runs downloads end to end.
#[derive(Clone)]
pub struct Downloader {
    buffered: Arc<dyn Transport>,
    streaming: Arc<dyn Transport>,
    sink: Arc<dyn Sink>,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader").finish_non_exhaustive()
    }
}

impl Downloader {
    /// Downloader that saves into `output_dir`, using `client` for buffered
    /// downloads and its base URL and session for streaming ones.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Build`] when the streaming client cannot be built.
    pub fn new(client: &ApiClient, output_dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        Ok(Self::with_parts(
            Arc::new(BufferedTransport::new(client.clone())),
            Arc::new(StreamingTransport::for_client(client)?),
            Arc::new(DirectorySink::new(output_dir)),
        ))
    }

    #[must_use]
    pub fn with_parts(
        buffered: Arc<dyn Transport>,
        streaming: Arc<dyn Transport>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            buffered,
            streaming,
            sink,
        }
    }

    /// Downloads `url` and saves it.
    ///
    /// Exactly one of `on_success` / `on_error` runs unless the `on_before`
    /// guard cancels, in which case neither does.
    ///
    /// # Errors
    ///
    /// Returns the transport or save error after passing it to `on_error`.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn download(
        &self,
        url: &str,
        options: DownloadOptions,
    ) -> Result<DownloadOutcome, DownloadError> {
        if let Some(before) = &options.on_before
            && !before()
        {
            info!("download cancelled by before-hook");
            return Ok(DownloadOutcome::Cancelled);
        }

        match self.run(url, &options).await {
            Ok(outcome) => {
                if let (Some(callback), DownloadOutcome::Saved { filename, .. }) =
                    (&options.on_success, &outcome)
                {
                    callback(filename);
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "download failed");
                if let Some(callback) = &options.on_error {
                    callback(&e);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<DownloadOutcome, DownloadError> {
        let wants_progress = options.on_progress.is_some();
        let transport = if wants_progress && self.streaming.supports_progress() {
            &self.streaming
        } else {
            if wants_progress {
                warn!("streaming transport cannot report progress; falling back to buffered");
            }
            &self.buffered
        };

        let request = DownloadRequest {
            url: url.to_string(),
            method: options.method,
            body: options.body.clone(),
            query: options.query.clone(),
        };
        let file = transport
            .fetch(&request, options.on_progress.as_ref())
            .await?;

        let filename = options
            .filename
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or(file.filename);
        let path = self.sink.save(&filename, &file.bytes).await?;

        Ok(DownloadOutcome::Saved {
            path,
            filename,
            bytes: file.bytes.len() as u64,
        })
    }
}

/// Observable state of a [`DownloadTracker`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadState {
    pub downloading: bool,
    /// Last reported percent, 0 until the first progress event.
    pub progress: u8,
    pub error: Option<ParsedError>,
}

/// Reactive wrapper around a [`Downloader`].
///
/// State is reset at the start of each download and published on a
/// `watch` channel; `downloading` drops back to `false` when it ends.
#[derive(Debug)]
pub struct DownloadTracker {
    downloader: Downloader,
    state: Arc<watch::Sender<DownloadState>>,
}

impl DownloadTracker {
    #[must_use]
    pub fn new(downloader: Downloader) -> Self {
        let (state, _) = watch::channel(DownloadState::default());
        Self {
            downloader,
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    /// Runs a download while publishing progress.
    ///
    /// A progress callback is always installed, so tracked downloads use the
    /// streaming transport. A caller-provided `on_progress` still runs.
    ///
    /// # Errors
    ///
    /// Same as [`Downloader::download`]; the error is also recorded in the state.
    pub async fn download(
        &self,
        url: &str,
        mut options: DownloadOptions,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.state.send_replace(DownloadState {
            downloading: true,
            progress: 0,
            error: None,
        });

        let state = Arc::clone(&self.state);
        let forward = options.on_progress.take();
        options.on_progress = Some(Arc::new(move |progress| {
            state.send_modify(|s| s.progress = progress.percent);
            if let Some(callback) = &forward {
                callback(progress);
            }
        }));

        let result = self.downloader.download(url, options).await;
        self.state.send_modify(|s| {
            s.downloading = false;
            if let Err(e) = &result {
                s.error = Some(ParsedError::from(e));
            }
        });
        result
    }
}
