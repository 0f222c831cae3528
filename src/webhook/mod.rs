//! Signed Git push webhook that triggers deployments.
//!
//! `POST /webhook` and `POST /deploy` accept GitHub and GitLab push events.
//! The raw body must carry an HMAC-SHA256 signature made with the shared
//! secret (`x-hub-signature-256: sha256=<hex>`, or the same value in
//! `x-gitlab-token`). Pushes to a deployment branch start the deploy script
//! in the background; the response does not wait for it.
//!
//! | Request | Response |
//! |---|---|
//! | valid push to `main`/`master` | 200 `Deployment triggered` |
//! | valid push to another branch | 200 `Skipped: not a deployment branch` |
//! | bad or missing signature | 401 `Unauthorized` |
//! | body is not JSON | 400 `Bad Request` |
//! | non-POST on a webhook path | 405 `Method Not Allowed` |
//! | `/health` | 200 `{"status":"ok","timestamp":...}` |
//! | anything else | 404 `Not Found` |

mod error;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, post};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info, instrument, warn};

pub use error::WebhookError;

use crate::config::WebhookSettings;
use crate::proxy;

type HmacSha256 = Hmac<Sha256>;

/// GitHub signature header.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// GitLab token header, checked when the GitHub header is absent.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";
/// Branches whose pushes trigger a deployment.
pub const DEPLOY_BRANCHES: [&str; 2] = ["main", "master"];

const SIGNATURE_PREFIX: &str = "sha256=";
const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Signature header value for `body`: `sha256=<hex hmac>`.
///
/// # Errors
///
/// Returns [`WebhookError::Key`] if the key is rejected by the MAC.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(WebhookError::Key)?;
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks `signature` against the HMAC of `body`.
///
/// Without a secret every request passes (with a warning). With a secret, a
/// missing or malformed signature fails. The signature must have the form
/// `sha256=<hex>`; the comparison is constant-time.
#[must_use]
pub fn verify_signature(secret: Option<&str>, signature: Option<&str>, body: &[u8]) -> bool {
    let Some(secret) = secret else {
        warn!("WEBHOOK_SECRET not set; skipping signature verification");
        return true;
    };
    let Some(signature) = signature else {
        return false;
    };
    let Some(hex_digest) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Pushed branch: GitHub `ref` without `refs/heads/`, else GitLab
/// `object_attributes.ref`.
#[must_use]
pub fn extract_branch(payload: &Value) -> Option<String> {
    let github = payload
        .get("ref")
        .and_then(Value::as_str)
        .map(|r| r.replacen(BRANCH_REF_PREFIX, "", 1))
        .filter(|b| !b.is_empty());
    github.or_else(|| {
        payload
            .pointer("/object_attributes/ref")
            .and_then(Value::as_str)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
    })
}

/// Runs a deployment.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploys `branch`; resolves when the deployment has finished.
    async fn deploy(&self, branch: &str) -> Result<(), WebhookError>;
}

/// Runs `bash <script>`, inheriting stdio.
#[derive(Debug, Clone)]
pub struct ScriptDeployer {
    script: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ScriptDeployer {
    #[must_use]
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            working_dir: None,
        }
    }

    /// Runs the script from `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[async_trait]
impl Deployer for ScriptDeployer {
    #[instrument(skip(self), fields(script = %self.script.display()))]
    async fn deploy(&self, branch: &str) -> Result<(), WebhookError> {
        info!("starting deployment");
        let mut command = tokio::process::Command::new("bash");
        command.arg(&self.script);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let status = command.status().await.map_err(|source| WebhookError::Spawn {
            path: self.script.clone(),
            source,
        })?;
        if status.success() {
            info!("deployment finished");
            Ok(())
        } else {
            Err(WebhookError::DeployFailed {
                path: self.script.clone(),
                code: status.code(),
            })
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub branches: Vec<String>,
}

impl WebhookConfig {
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret,
            branches: DEPLOY_BRANCHES.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &WebhookSettings) -> Self {
        Self::new(settings.secret.clone())
    }

    #[must_use]
    pub fn is_deploy_branch(&self, branch: &str) -> bool {
        self.branches.iter().any(|b| b == branch)
    }
}

/// Shared state of the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    config: Arc<WebhookConfig>,
    deployer: Arc<dyn Deployer>,
}

impl WebhookState {
    pub fn new(config: WebhookConfig, deployer: Arc<dyn Deployer>) -> Self {
        Self {
            config: Arc::new(config),
            deployer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }
}

/// Routes: `/webhook`, `/deploy`, `/health`; everything else is 404.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(handle_push).fallback(method_not_allowed))
        .route("/deploy", post(handle_push).fallback(method_not_allowed))
        .route("/health", any(proxy::health))
        .fallback(not_found)
        .with_state(state)
}

/// Serves the webhook on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`WebhookError::Serve`] when the server loop fails.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: WebhookState,
    shutdown: F,
) -> Result<(), WebhookError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "webhook listening on /webhook and /deploy");
    }
    if state.config.secret.is_none() {
        warn!("WEBHOOK_SECRET not set; requests will not be authenticated");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(WebhookError::Serve)
}

#[instrument(skip_all)]
async fn handle_push(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(GITLAB_TOKEN_HEADER))
        .and_then(|v| v.to_str().ok());
    if !verify_signature(state.config.secret.as_deref(), signature, &body) {
        error!("signature verification failed");
        return Err(WebhookError::Unauthorized);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "failed to parse payload");
        WebhookError::bad_request(e.to_string())
    })?;
    if !payload.is_object() {
        error!("payload is not a JSON object");
        return Err(WebhookError::bad_request("payload must be a JSON object"));
    }
    let branch = extract_branch(&payload);
    info!(branch = branch.as_deref().unwrap_or("<none>"), "push event received");

    match branch {
        Some(branch) if state.config.is_deploy_branch(&branch) => {
            let deployer = Arc::clone(&state.deployer);
            tokio::spawn(async move {
                if let Err(e) = deployer.deploy(&branch).await {
                    error!(%branch, error = %e, "deployment failed");
                }
            });
            Ok("Deployment triggered")
        }
        other => {
            info!(branch = other.as_deref().unwrap_or("<none>"), "skipping branch");
            Ok("Skipped: not a deployment branch")
        }
    }
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
