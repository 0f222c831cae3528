//! Toast notification service.
//!
//! [`NotificationService`] owns the ordered list of visible toasts. It is a
//! cheap-to-clone handle: the application root creates one and passes clones
//! to the API client, the download pipeline, and anything else that reports
//! to the user. Insertion order is display order.
//!
//! Toasts with a non-zero duration are removed automatically once the
//! duration elapses. Auto-dismiss needs a Tokio runtime; toasts shown outside
//! one stay until closed.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Display duration for success, warning, and info toasts.
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(4000);

/// Display duration for error toasts.
pub const ERROR_TOAST_DURATION: Duration = Duration::from_millis(6000);

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for ToastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

/// A toast currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastMessage {
    pub id: String,
    pub kind: ToastKind,
    pub title: String,
    pub message: Option<String>,
    /// Zero means the toast stays until closed.
    pub duration: Duration,
    pub closable: bool,
}

/// Parameters for [`NotificationService::show`].
#[derive(Debug, Clone)]
pub struct ToastOptions {
    pub kind: ToastKind,
    pub title: String,
    pub message: Option<String>,
    pub duration: Duration,
    pub closable: bool,
}

impl ToastOptions {
    /// Options with the default duration and a close button.
    pub fn new(kind: ToastKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: None,
            duration: DEFAULT_TOAST_DURATION,
            closable: true,
        }
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn closable(mut self, closable: bool) -> Self {
        self.closable = closable;
        self
    }
}

/// Shared, ordered list of toasts.
#[derive(Debug, Clone, Default)]
pub struct NotificationService {
    toasts: Arc<Mutex<Vec<ToastMessage>>>,
}

impl NotificationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows a toast and returns its id.
    pub fn show(&self, options: ToastOptions) -> String {
        let id = generate_id();
        let toast = ToastMessage {
            id: id.clone(),
            kind: options.kind,
            title: options.title,
            message: options.message,
            duration: options.duration,
            closable: options.closable,
        };
        log_toast(&toast);

        let duration = toast.duration;
        self.lock().push(toast);

        if !duration.is_zero() {
            self.schedule_dismiss(id.clone(), duration);
        }
        id
    }

    /// Removes a toast. Unknown ids are ignored.
    pub fn close(&self, id: &str) {
        let mut toasts = self.lock();
        if let Some(index) = toasts.iter().position(|t| t.id == id) {
            toasts.remove(index);
        }
    }

    pub fn close_all(&self) {
        self.lock().clear();
    }

    /// Snapshot of visible toasts in display order.
    #[must_use]
    pub fn toasts(&self) -> Vec<ToastMessage> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn success(&self, title: impl Into<String>, message: Option<&str>) -> String {
        self.show(with_message(ToastOptions::new(ToastKind::Success, title), message))
    }

    pub fn error(&self, title: impl Into<String>, message: Option<&str>) -> String {
        self.show(
            with_message(ToastOptions::new(ToastKind::Error, title), message)
                .duration(ERROR_TOAST_DURATION),
        )
    }

    pub fn warning(&self, title: impl Into<String>, message: Option<&str>) -> String {
        self.show(with_message(ToastOptions::new(ToastKind::Warning, title), message))
    }

    pub fn info(&self, title: impl Into<String>, message: Option<&str>) -> String {
        self.show(with_message(ToastOptions::new(ToastKind::Info, title), message))
    }

    /// Shows a toast of the given kind with the kind's default duration.
    pub fn notify(&self, kind: ToastKind, title: impl Into<String>, message: Option<&str>) -> String {
        match kind {
            ToastKind::Success => self.success(title, message),
            ToastKind::Error => self.error(title, message),
            ToastKind::Warning => self.warning(title, message),
            ToastKind::Info => self.info(title, message),
        }
    }

    fn schedule_dismiss(&self, id: String, duration: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(id = %id, "no async runtime; toast will stay until closed");
            return;
        };
        let service = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(duration).await;
            service.close(&id);
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ToastMessage>> {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn with_message(options: ToastOptions, message: Option<&str>) -> ToastOptions {
    match message {
        Some(message) => options.message(message),
        None => options,
    }
}

fn log_toast(toast: &ToastMessage) {
    let body = toast.message.as_deref().unwrap_or("");
    match toast.kind {
        ToastKind::Error => error!(title = %toast.title, body, "toast"),
        ToastKind::Warning => warn!(title = %toast.title, body, "toast"),
        ToastKind::Success | ToastKind::Info => info!(title = %toast.title, body, "toast"),
    }
}

fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("toast-{millis}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_appends_in_insertion_order() {
        let service = NotificationService::new();
        let first = service.show(ToastOptions::new(ToastKind::Info, "one").duration(Duration::ZERO));
        let second =
            service.show(ToastOptions::new(ToastKind::Success, "two").duration(Duration::ZERO));

        let toasts = service.toasts();
        assert_eq!(toasts.len(), 2);
        assert_eq!(toasts[0].id, first);
        assert_eq!(toasts[1].id, second);
        assert_ne!(first, second);
    }

    #[test]
    fn test_ids_have_toast_prefix() {
        let id = generate_id();
        assert!(id.starts_with("toast-"), "unexpected id: {id}");
        assert_eq!(id.rsplit('-').next().map(str::len), Some(7));
    }

    #[test]
    fn test_close_removes_only_target() {
        let service = NotificationService::new();
        let keep = service.show(ToastOptions::new(ToastKind::Info, "keep").duration(Duration::ZERO));
        let drop = service.show(ToastOptions::new(ToastKind::Info, "drop").duration(Duration::ZERO));

        service.close(&drop);
        service.close("toast-unknown");

        let toasts = service.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].id, keep);
    }

    #[test]
    fn test_close_all_empties_list() {
        let service = NotificationService::new();
        service.show(ToastOptions::new(ToastKind::Info, "a").duration(Duration::ZERO));
        service.show(ToastOptions::new(ToastKind::Info, "b").duration(Duration::ZERO));
        service.close_all();
        assert!(service.is_empty());
    }

    #[test]
    fn test_defaults_per_kind() {
        let service = NotificationService::new();
        service.error("Request failed", Some("boom"));
        service.warning("Notice", None);

        let toasts = service.toasts();
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(toasts[0].duration, ERROR_TOAST_DURATION);
        assert_eq!(toasts[0].message.as_deref(), Some("boom"));
        assert!(toasts[0].closable);
        assert_eq!(toasts[1].duration, DEFAULT_TOAST_DURATION);
        assert_eq!(toasts[1].message, None);
    }

    #[test]
    fn test_clones_share_list() {
        let service = NotificationService::new();
        let handle = service.clone();
        handle.info("shared", None);
        assert_eq!(service.len(), 1);
    }

    #[tokio::test]
    async fn test_toast_auto_dismisses_after_duration() {
        let service = NotificationService::new();
        let id = service.show(
            ToastOptions::new(ToastKind::Info, "short").duration(Duration::from_millis(100)),
        );

        assert!(service.toasts().iter().any(|t| t.id == id));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(
            !service.toasts().iter().any(|t| t.id == id),
            "toast should be gone after its duration"
        );
    }

    #[tokio::test]
    async fn test_zero_duration_toast_is_sticky() {
        let service = NotificationService::new();
        service.show(ToastOptions::new(ToastKind::Info, "sticky").duration(Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.len(), 1);
    }
}
