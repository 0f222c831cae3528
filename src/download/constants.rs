//! Constants for the download module (timeouts, buffer sizing).

use std::time::Duration;

/// HTTP connect timeout for streaming downloads.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall timeout for a streaming download (5 minutes for large files).
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound for the up-front buffer reservation taken from `Content-Length`.
pub const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;
