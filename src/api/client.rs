//! The configured API client facade.
//!
//! [`ApiClient`] wraps a `reqwest::Client` with the site's cross-cutting
//! request/response behaviour:
//!
//! - request phase: default `Content-Type: application/json`, bearer token
//!   from the [`Session`]
//! - response phase: envelope `code` inspection (business errors warn but do
//!   not fail unless the request is strict)
//! - error phase: status-keyed [`StatusPolicy`](super::StatusPolicy)
//!   notifications and session actions
//! - transport failures: logged and surfaced as a "Network error" toast, never
//!   retried here

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::envelope::{
    ApiErrorBody, ApiResponse, PaginatedData, PaginationParams, business_error, unwrap_envelope,
};
use super::error::ApiClientError;
use super::policy::{PolicyAction, policy_for};
use crate::auth::Session;
use crate::config::AppConfig;
use crate::notify::NotificationService;
use crate::user_agent;

/// Connect timeout for API requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json";

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    /// Return the full envelope instead of `data`.
    pub raw: bool,
    /// Show toasts for HTTP error statuses.
    pub show_error: bool,
    /// Fail with [`ApiClientError::Business`] when the envelope `code` is not a success code.
    pub strict: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            raw: false,
            show_error: true,
            strict: false,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_queries<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    #[must_use]
    pub fn show_error(mut self, show_error: bool) -> Self {
        self.show_error = show_error;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Body and metadata of a binary (non-envelope) response.
#[derive(Debug, Clone)]
pub struct BinaryResponse {
    /// Final URL after redirects.
    pub url: String,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

/// HTTP client facade shared across the application.
///
/// Cloning is cheap: clones share the connection pool, session, and
/// notification list.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<Session>,
    notifier: NotificationService,
}

impl ApiClient {
    /// Creates a client for `base_url` with the given overall request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::InvalidUrl`] when `base_url` is not absolute,
    /// or [`ApiClientError::Build`] when the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<Session>,
        notifier: NotificationService,
    ) -> Result<Self, ApiClientError> {
        Url::parse(base_url).map_err(|_| ApiClientError::invalid_url(base_url))?;
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent::default_client_user_agent())
            .build()
            .map_err(ApiClientError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            notifier,
        })
    }

    /// Creates a client from application configuration.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::new`].
    pub fn from_config(
        config: &AppConfig,
        session: Arc<Session>,
        notifier: NotificationService,
    ) -> Result<Self, ApiClientError> {
        Self::new(&config.api_base_url(), config.api_timeout, session, notifier)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn notifier(&self) -> &NotificationService {
        &self.notifier
    }

    /// Builds the absolute URL for `path` with `query` appended.
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::InvalidUrl`] when the result does not parse.
    pub fn resolve_url(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Url, ApiClientError> {
        build_url(&self.base_url, path, query)
    }

    /// Sends a request through the interceptors and returns the raw response.
    ///
    /// Non-2xx statuses are dispatched through the status policy table and
    /// returned as [`ApiClientError::HttpStatus`].
    ///
    /// # Errors
    ///
    /// Returns transport, URL, or HTTP status errors.
    #[instrument(skip(self, options), fields(method = %options.method, path = %path))]
    pub async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Response, ApiClientError> {
        let url = self.resolve_url(path, &options.query)?;
        let url_string = url.to_string();
        debug!(url = %url_string, "sending API request");

        let mut request = self
            .http
            .request(options.method.clone(), url)
            .headers(self.request_headers(&options.headers));
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.on_request_error(url_string, e)),
        };

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            let body = serde_json::from_slice::<ApiErrorBody>(&bytes).ok();
            return Err(self.on_response_error(url_string, status.as_u16(), body, options.show_error));
        }

        Ok(response)
    }

    /// Sends a request and returns the (possibly unwrapped) JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send); also [`ApiClientError::Decode`] for non-JSON
    /// bodies and [`ApiClientError::Business`] in strict mode.
    pub async fn request_value(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value, ApiClientError> {
        let response = self.send(path, &options).await?;
        let url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.on_request_error(url.clone(), e))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| ApiClientError::decode(&url, e))?
        };

        self.on_response(&url, &body, &options)?;
        Ok(unwrap_envelope(body, options.raw))
    }

    /// Sends a request and decodes the envelope's `data` as `T`.
    ///
    /// # Errors
    ///
    /// See [`request_value`](Self::request_value).
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiClientError> {
        let value = self.request_value(path, options.raw(false)).await?;
        serde_json::from_value(value).map_err(|e| ApiClientError::decode(path, e))
    }

    /// Sends a request and decodes the full envelope. A missing `data` field
    /// becomes `T::default()`.
    ///
    /// # Errors
    ///
    /// See [`request_value`](Self::request_value).
    pub async fn request_raw<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiClientError> {
        let value = self.request_value(path, options.raw(true)).await?;
        serde_json::from_value(value).map_err(|e| ApiClientError::decode(path, e))
    }

    /// `GET` with query parameters.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiClientError> {
        self.request(path, RequestOptions::get().with_queries(query.iter().copied()))
            .await
    }

    /// `POST` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiClientError> {
        let body = encode_body(path, body)?;
        self.request(path, RequestOptions::method(Method::POST).with_body(body))
            .await
    }

    /// `PUT` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiClientError> {
        let body = encode_body(path, body)?;
        self.request(path, RequestOptions::method(Method::PUT).with_body(body))
            .await
    }

    /// `PATCH` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiClientError> {
        let body = encode_body(path, body)?;
        self.request(path, RequestOptions::method(Method::PATCH).with_body(body))
            .await
    }

    /// `DELETE`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        self.request(path, RequestOptions::method(Method::DELETE))
            .await
    }

    /// Paginated listing: `params` are merged into the query string ahead of `filters`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn page_list<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &PaginationParams,
        filters: &[(&str, &str)],
    ) -> Result<PaginatedData<T>, ApiClientError> {
        let options = RequestOptions::get()
            .with_queries(params.to_query())
            .with_queries(filters.iter().copied());
        self.request(path, options).await
    }

    /// Sends a request and returns the body as bytes, without envelope handling.
    ///
    /// Used for file downloads; request interceptors and error dispatch still apply.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn fetch_bytes(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<BinaryResponse, ApiClientError> {
        let response = self.send(path, options).await?;
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.on_request_error(url.clone(), e))?
            .to_vec();
        Ok(BinaryResponse {
            url,
            headers,
            bytes,
        })
    }

    fn request_headers(&self, custom: &HeaderMap) -> HeaderMap {
        let mut headers = custom.clone();
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        if let Some(bearer) = self.session.bearer_header() {
            match HeaderValue::from_str(&bearer) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("bearer token contains invalid header characters; not attached"),
            }
        }
        headers
    }

    fn on_request_error(&self, url: String, source: reqwest::Error) -> ApiClientError {
        error!(url = %url, error = %source, "API request error");
        self.notifier
            .error("Network error", Some("Please check your connection and try again"));
        ApiClientError::transport(url, source)
    }

    fn on_response(
        &self,
        url: &str,
        body: &Value,
        options: &RequestOptions,
    ) -> Result<(), ApiClientError> {
        let Some((code, message)) = business_error(body) else {
            return Ok(());
        };
        warn!(url = %url, code, server_message = %message, "API business error");
        if !message.is_empty() {
            self.notifier.warning("Notice", Some(message));
        }
        if options.strict {
            return Err(ApiClientError::Business {
                url: url.to_string(),
                code,
                message: message.to_string(),
            });
        }
        Ok(())
    }

    fn on_response_error(
        &self,
        url: String,
        status: u16,
        body: Option<ApiErrorBody>,
        show_error: bool,
    ) -> ApiClientError {
        let policy = policy_for(status);
        let (server_message, details) = match body {
            Some(body) => ((!body.message.is_empty()).then_some(body.message), body.details),
            None => (None, None),
        };
        error!(
            url = %url,
            status,
            server_message = server_message.as_deref().unwrap_or(""),
            "API error response"
        );

        for action in policy.actions {
            match action {
                PolicyAction::ClearAuth => self.session.expire_credentials(),
                PolicyAction::RedirectLogin => self.session.redirect_to_login(),
            }
        }

        if show_error {
            let message = policy.resolve_message(status, server_message.as_deref());
            self.notifier.notify(policy.level, policy.title, Some(&message));
        }

        ApiClientError::HttpStatus {
            url,
            status,
            message: server_message,
            details,
        }
    }
}

/// Returns true for `http://` and `https://` URLs.
pub(crate) fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Joins `path` onto `base` (absolute paths pass through) and appends `query`.
pub(crate) fn build_url(
    base: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<Url, ApiClientError> {
    let joined = if is_absolute_url(path) {
        path.to_string()
    } else if path.is_empty() {
        base.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    let mut url = Url::parse(&joined).map_err(|_| ApiClientError::invalid_url(&joined))?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

fn encode_body<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<Value, ApiClientError> {
    serde_json::to_value(body).map_err(|source| ApiClientError::Encode {
        url: path.to_string(),
        source,
    })
}
