//! File downloads with optional progress reporting.
//!
//! A download fetches the body through one of two [`Transport`]s, derives a
//! filename from `Content-Disposition` (or the URL), and hands the bytes to a
//! save [`Sink`].
//!
//! # Features
//!
//! - Buffered downloads through the [`ApiClient`](crate::api::ApiClient), so
//!   auth headers and error notifications apply
//! - Streaming downloads with per-chunk progress when `Content-Length` is known
//! - `filename*=UTF-8''` and `filename=` parsing, case-insensitive
//! - Duplicate filename handling (adds numeric suffix)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use portal_core::download::{DownloadOptions, Downloader};
//! use portal_core::{ApiClient, NotificationService, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(
//!     "https://example.com/api",
//!     Duration::from_secs(30),
//!     Arc::new(Session::new()),
//!     NotificationService::new(),
//! )?;
//! let downloader = Downloader::new(&client, "./downloads")?;
//! let options = DownloadOptions::new()
//!     .on_progress(Arc::new(|p| println!("{}%", p.percent)));
//! downloader.download("/files/report.pdf", options).await?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod error;
mod filename;
mod orchestrator;
mod progress;
mod save;
mod transport;

pub use error::DownloadError;
pub use filename::{DEFAULT_FILENAME, extract_filename};
pub use orchestrator::{
    BeforeFn, DownloadOptions, DownloadOutcome, DownloadState, DownloadTracker, Downloader,
    ErrorFn, SuccessFn,
};
pub use progress::DownloadProgress;
pub use save::{DirectorySink, Sink};
pub use transport::{
    BufferedTransport, DownloadMethod, DownloadRequest, DownloadedFile, ProgressFn,
    StreamingTransport, Transport,
};
