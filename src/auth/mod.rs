//! Session credential and navigation state.
//!
//! Holds the bearer token (the `token` cookie on the website), the path the
//! user is currently on, and the path to return to after signing in. The API
//! client clears the token and records a redirect to [`LOGIN_PATH`] when the
//! backend answers 401.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

/// Name of the cookie that carries the bearer token on the website.
pub const TOKEN_COOKIE: &str = "token";

/// Login page path.
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    current_path: String,
    redirect_after_login: Option<String>,
    pending_navigation: Option<String>,
}

/// Thread-safe session store shared between the API client and download transports.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session that already holds a bearer token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    /// Returns the bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    /// Stores a bearer token. Empty tokens are treated as absent.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.write().token = (!token.is_empty()).then_some(token);
    }

    pub fn clear_token(&self) {
        self.write().token = None;
    }

    /// `Authorization` header value when a token is present.
    #[must_use]
    pub fn bearer_header(&self) -> Option<String> {
        self.token().map(|token| format!("Bearer {token}"))
    }

    /// Records the path the user is on.
    pub fn set_current_path(&self, path: impl Into<String>) {
        self.write().current_path = path.into();
    }

    #[must_use]
    pub fn current_path(&self) -> String {
        self.read().current_path.clone()
    }

    /// Path to return to after a successful login.
    #[must_use]
    pub fn redirect_after_login(&self) -> Option<String> {
        self.read().redirect_after_login.clone()
    }

    /// Returns and forgets the post-login redirect.
    pub fn take_redirect_after_login(&self) -> Option<String> {
        self.write().redirect_after_login.take()
    }

    /// Requests navigation to `path`; the UI layer consumes it with
    /// [`take_pending_navigation`](Self::take_pending_navigation).
    pub fn navigate(&self, path: impl Into<String>) {
        let path = path.into();
        debug!(path = %path, "navigation requested");
        let mut state = self.write();
        state.current_path.clone_from(&path);
        state.pending_navigation = Some(path);
    }

    #[must_use]
    pub fn pending_navigation(&self) -> Option<String> {
        self.read().pending_navigation.clone()
    }

    pub fn take_pending_navigation(&self) -> Option<String> {
        self.write().pending_navigation.take()
    }

    /// Drops the token without touching navigation state.
    pub(crate) fn expire_credentials(&self) {
        let mut state = self.write();
        if state.token.take().is_some() {
            info!("bearer token cleared after 401");
        }
    }

    /// Remembers the current path (unless it is the login page) and
    /// navigates to [`LOGIN_PATH`].
    pub(crate) fn redirect_to_login(&self) {
        {
            let mut state = self.write();
            let current = state.current_path.clone();
            if !current.is_empty() && current != LOGIN_PATH {
                state.redirect_after_login = Some(current);
            }
        }
        self.navigate(LOGIN_PATH);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads the `token` cookie from a `Cookie` header value.
#[must_use]
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}
