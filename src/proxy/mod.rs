//! Reverse proxy from the site origin to the upstream API.
//!
//! Every request under the configured prefix (default `/api`) is forwarded
//! to the upstream with the prefix stripped. Method, body, query, and all
//! end-to-end headers pass through; `Host` is rewritten to the upstream and
//! `X-Forwarded-*` headers describe the original request. The upstream's
//! status, headers, and body are relayed back as a stream.
//!
//! Two local routes are answered without forwarding: `GET {prefix}/demo`
//! and `GET /health`.
//!
//! # Example
//!
//! ```no_run
//! use portal_core::proxy::{self, ProxyConfig, ProxyState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = ProxyState::new(ProxyConfig::new("https://api.example.com", "/api")?)?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! proxy::serve(listener, state, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

mod error;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{self, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use error::ProxyError;

use crate::config::AppConfig;
use crate::user_agent;

/// Largest inbound body buffered before forwarding (32 MiB).
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Connection-scoped headers that are never relayed in either direction.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Where and under which path prefix requests are forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Upstream origin without trailing slash, e.g. `https://api.example.com`.
    upstream: String,
    /// `host[:port]` sent as the `Host` header upstream.
    upstream_host: String,
    /// Path prefix, e.g. `/api`.
    prefix: String,
}

impl ProxyConfig {
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidUpstream`] unless `upstream` is an
    /// absolute http(s) URL with a host, and [`ProxyError::InvalidPrefix`]
    /// when `prefix` is the root.
    pub fn new(upstream: &str, prefix: &str) -> Result<Self, ProxyError> {
        let upstream = upstream.trim_end_matches('/');
        let parsed = Url::parse(upstream).map_err(|_| ProxyError::invalid_upstream(upstream))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProxyError::invalid_upstream(upstream));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| ProxyError::invalid_upstream(upstream))?;
        let upstream_host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ProxyError::invalid_prefix(prefix));
        }

        Ok(Self {
            upstream: upstream.to_string(),
            upstream_host,
            prefix: format!("/{trimmed}"),
        })
    }

    /// Uses `api_target` and `proxy_prefix` from the application config.
    ///
    /// # Errors
    ///
    /// See [`ProxyConfig::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ProxyError> {
        Self::new(&config.api_target, &config.proxy_prefix)
    }

    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    #[must_use]
    pub fn upstream_host(&self) -> &str {
        &self.upstream_host
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Shared state of the proxy routes.
#[derive(Debug, Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    config: Arc<ProxyConfig>,
}

impl ProxyState {
    /// Builds the upstream client.
    ///
    /// Redirects are relayed to the caller instead of followed, and bodies
    /// are passed through without decompression.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Build`] if the HTTP client cannot be created.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent::default_proxy_user_agent())
            .redirect(reqwest::redirect::Policy::none())
            .no_gzip()
            .build()
            .map_err(ProxyError::Build)?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Upstream destination derived from one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Full upstream URL including the query.
    pub target_url: String,
    /// Path with the prefix removed; always starts with `/`.
    pub path: String,
    pub query: Option<String>,
}

impl ProxyTarget {
    /// Strips `prefix` from the inbound path and rebuilds the URL on `upstream`.
    #[must_use]
    pub fn from_request(upstream: &str, prefix: &str, uri: &Uri) -> Self {
        let prefix = prefix.trim_end_matches('/');
        let remainder = uri.path().strip_prefix(prefix).unwrap_or(uri.path());
        let path = if remainder.starts_with('/') {
            remainder.to_string()
        } else {
            format!("/{remainder}")
        };
        let query = uri.query().filter(|q| !q.is_empty()).map(str::to_string);
        let target_url = match &query {
            Some(q) => format!("{}{path}?{q}", upstream.trim_end_matches('/')),
            None => format!("{}{path}", upstream.trim_end_matches('/')),
        };

        Self {
            target_url,
            path,
            query,
        }
    }
}

/// Headers sent upstream for an inbound request.
///
/// Drops hop-by-hop headers and `Content-Length`, rewrites `Host`, and sets
/// `X-Forwarded-Host`, `X-Forwarded-Proto`, and `X-Forwarded-For`.
#[must_use]
pub fn forwarded_headers(inbound: &HeaderMap, upstream_host: &str, peer: Option<IpAddr>) -> HeaderMap {
    let mut headers = strip_hop_by_hop(inbound);
    let inbound_host = inbound.get(header::HOST).cloned();
    headers.remove(header::HOST);

    if let Ok(host) = HeaderValue::from_str(upstream_host) {
        headers.insert(header::HOST, host);
    }
    headers.insert(
        X_FORWARDED_HOST,
        inbound_host.unwrap_or_else(|| HeaderValue::from_static("")),
    );
    let proto = inbound
        .get(&X_FORWARDED_PROTO)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("http"));
    headers.insert(X_FORWARDED_PROTO, proto);
    let client_ip = peer
        .and_then(|ip| HeaderValue::from_str(&ip.to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static(""));
    headers.insert(X_FORWARDED_FOR, client_ip);
    headers
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in &HOP_BY_HOP {
        out.remove(name);
    }
    out.remove(header::CONTENT_LENGTH);
    out
}

/// Routes: `/health`, `{prefix}/demo`, and everything else under `{prefix}`.
pub fn router(state: ProxyState) -> Router {
    let prefix = state.config.prefix.clone();
    Router::new()
        .route("/health", get(health))
        .route(&format!("{prefix}/demo"), get(demo))
        .route(&prefix, any(forward))
        .route(&format!("{prefix}/"), any(forward))
        .route(&format!("{prefix}/{{*rest}}"), any(forward))
        .fallback(not_found)
        .with_state(state)
}

/// Serves the proxy on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ProxyError::Serve`] when the server loop fails.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: ProxyState,
    shutdown: F,
) -> Result<(), ProxyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(
            %addr,
            upstream = %state.config.upstream,
            prefix = %state.config.prefix,
            "proxy listening"
        );
    }
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ProxyError::Serve)
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn forward(State(state): State<ProxyState>, request: Request) -> Result<Response, ProxyError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = request.into_parts();
    let target = ProxyTarget::from_request(&state.config.upstream, &state.config.prefix, &parts.uri);
    let headers = forwarded_headers(&parts.headers, &state.config.upstream_host, peer);
    let body = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|source| ProxyError::RequestBody { source })?;

    debug!(target_url = %target.target_url, body_len = body.len(), "forwarding");
    let upstream = state
        .client
        .request(parts.method, &target.target_url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            warn!(target_url = %target.target_url, error = %e, "upstream request failed");
            ProxyError::upstream(&target.target_url, e)
        })?;

    let status = upstream.status();
    debug!(status = status.as_u16(), "upstream responded");
    let headers = strip_hop_by_hop(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

async fn demo() -> Json<Value> {
    Json(json!({ "message": "Hello World", "status": 200 }))
}

/// Liveness probe shared by the proxy and the webhook listener.
pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
