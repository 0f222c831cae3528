//! API client facade for the site backend.
//!
//! Every non-binary endpoint answers with the `{code, data, message}`
//! envelope. [`ApiClient`] layers base URL handling, bearer-token injection,
//! and status-code keyed notifications over a shared `reqwest` client, and
//! unwraps the envelope so callers see `data` directly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use portal_core::api::{ApiClient, RequestOptions};
//! use portal_core::{NotificationService, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(
//!     "https://example.com/api",
//!     Duration::from_secs(30),
//!     Arc::new(Session::new()),
//!     NotificationService::new(),
//! )?;
//! let user: serde_json::Value = client.get("/users/1", &[]).await?;
//! let envelope = client
//!     .request_raw::<serde_json::Value>("/users/1", RequestOptions::get())
//!     .await?;
//! println!("{user} {}", envelope.code);
//! # Ok(())
//! # }
//! ```

mod client;
mod envelope;
mod error;
mod policy;

pub use client::{ApiClient, BinaryResponse, RequestOptions};
pub(crate) use client::is_absolute_url;
pub use envelope::{
    ApiErrorBody, ApiResponse, PaginatedData, PaginationParams, SortOrder, business_error,
    is_success_code, unwrap_envelope,
};
pub use error::{ApiClientError, ParsedError, parse_error};
pub use policy::{PolicyAction, StatusPolicy, friendly_error_message, policy_for};
