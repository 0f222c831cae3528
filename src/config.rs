//! Environment-driven configuration.
//!
//! Every setting has a default, so an empty environment yields a working
//! local setup. Binaries load an [`AppConfig`] once at startup and let clap
//! flags override individual fields.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::api::is_absolute_url;

pub const ENV_API_URL: &str = "PORTAL_API_URL";
pub const ENV_PUBLIC_ORIGIN: &str = "PORTAL_PUBLIC_ORIGIN";
pub const ENV_API_TIMEOUT_MS: &str = "PORTAL_API_TIMEOUT_MS";
pub const ENV_API_TARGET: &str = "PORTAL_API_TARGET";
pub const ENV_PROXY_PREFIX: &str = "PORTAL_PROXY_PREFIX";
pub const ENV_LISTEN: &str = "PORTAL_LISTEN";
pub const ENV_THEME_FILE: &str = "PORTAL_THEME_FILE";
pub const ENV_WEBHOOK_SECRET: &str = "WEBHOOK_SECRET";
pub const ENV_WEBHOOK_PORT: &str = "WEBHOOK_PORT";
pub const ENV_DEPLOY_SCRIPT: &str = "DEPLOY_SCRIPT";

pub const DEFAULT_API_URL: &str = "/api";
pub const DEFAULT_PUBLIC_ORIGIN: &str = "http://127.0.0.1:3000";
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_API_TARGET: &str = "https://api.example.com";
pub const DEFAULT_PROXY_PREFIX: &str = "/api";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_THEME_FILE: &str = ".portal-theme";
pub const DEFAULT_WEBHOOK_PORT: u16 = 9000;
pub const DEFAULT_DEPLOY_SCRIPT: &str = "./scripts/deploy.sh";

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Settings of the deployment webhook listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Shared HMAC secret; signature checks are skipped when unset.
    pub secret: Option<String>,
    pub port: u16,
    pub deploy_script: PathBuf,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            port: DEFAULT_WEBHOOK_PORT,
            deploy_script: PathBuf::from(DEFAULT_DEPLOY_SCRIPT),
        }
    }
}

/// Resolved application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// API base for the client; relative values resolve against `public_origin`.
    pub api_url: String,
    pub public_origin: String,
    pub api_timeout: Duration,
    /// Upstream the proxy forwards to.
    pub api_target: String,
    pub proxy_prefix: String,
    pub listen: SocketAddr,
    pub theme_file: PathBuf,
    pub webhook: WebhookSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            public_origin: DEFAULT_PUBLIC_ORIGIN.to_string(),
            api_timeout: Duration::from_millis(DEFAULT_API_TIMEOUT_MS),
            api_target: DEFAULT_API_TARGET.to_string(),
            proxy_prefix: DEFAULT_PROXY_PREFIX.to_string(),
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            theme_file: PathBuf::from(DEFAULT_THEME_FILE),
            webhook: WebhookSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set but cannot be parsed or
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through `lookup`, treating empty values as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparsable or invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = get(ENV_API_URL) {
            config.api_url = value;
        }
        if let Some(value) = get(ENV_PUBLIC_ORIGIN) {
            config.public_origin = value.trim_end_matches('/').to_string();
        }
        if let Some(value) = get(ENV_API_TIMEOUT_MS) {
            let millis = value
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(ENV_API_TIMEOUT_MS, &value, e.to_string()))?;
            config.api_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = get(ENV_API_TARGET) {
            config.api_target = value.trim_end_matches('/').to_string();
        }
        if let Some(value) = get(ENV_PROXY_PREFIX) {
            config.proxy_prefix = normalize_prefix(&value);
        }
        if let Some(value) = get(ENV_LISTEN) {
            config.listen = value
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::invalid(ENV_LISTEN, &value, e.to_string()))?;
        }
        if let Some(value) = get(ENV_THEME_FILE) {
            config.theme_file = PathBuf::from(value);
        }
        config.webhook.secret = get(ENV_WEBHOOK_SECRET);
        if let Some(value) = get(ENV_WEBHOOK_PORT) {
            config.webhook.port = value
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::invalid(ENV_WEBHOOK_PORT, &value, e.to_string()))?;
        }
        if let Some(value) = get(ENV_DEPLOY_SCRIPT) {
            config.webhook.deploy_script = PathBuf::from(value);
        }

        config.validate()?;
        debug!(
            api_url = %config.api_url,
            api_target = %config.api_target,
            listen = %config.listen,
            webhook_secret_set = config.webhook.secret.is_some(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Applies command-line overrides for the proxy and re-validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override fails [`validate`](Self::validate).
    pub fn with_proxy_overrides(
        mut self,
        listen: Option<SocketAddr>,
        upstream: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(listen) = listen {
            self.listen = listen;
        }
        if let Some(upstream) = upstream {
            self.api_target = upstream.trim().trim_end_matches('/').to_string();
        }
        if let Some(prefix) = prefix {
            self.proxy_prefix = normalize_prefix(prefix.trim());
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the timeout is zero, the proxy target or
    /// public origin is not an absolute http(s) URL, or the API base cannot
    /// be resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_timeout.is_zero() {
            return Err(ConfigError::invalid(ENV_API_TIMEOUT_MS, "0", "timeout must be positive"));
        }
        ensure_http_url(ENV_API_TARGET, &self.api_target)?;
        ensure_http_url(ENV_PUBLIC_ORIGIN, &self.public_origin)?;
        if !self.proxy_prefix.starts_with('/') || self.proxy_prefix.len() < 2 {
            return Err(ConfigError::invalid(
                ENV_PROXY_PREFIX,
                &self.proxy_prefix,
                "prefix must be a non-root path such as /api",
            ));
        }
        ensure_http_url(ENV_API_URL, &self.api_base_url())?;
        Ok(())
    }

    /// Absolute API base: `api_url` itself when absolute, otherwise joined
    /// onto `public_origin`.
    #[must_use]
    pub fn api_base_url(&self) -> String {
        if is_absolute_url(&self.api_url) {
            return self.api_url.trim_end_matches('/').to_string();
        }
        let path = self.api_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{path}", self.public_origin)
        } else {
            format!("{}/{path}", self.public_origin)
        }
    }
}

fn normalize_prefix(value: &str) -> String {
    let trimmed = value.trim_matches('/');
    format!("/{trimmed}")
}

fn ensure_http_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(value).map_err(|e| ConfigError::invalid(key, value, e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::invalid(key, value, "expected an http(s) URL with a host"));
    }
    Ok(())
}
