//! Light/dark/system theme management.
//!
//! [`ThemeManager`] owns the selected [`Theme`] and the [`Appearance`]
//! currently applied. Where the preference lives and how the system
//! appearance is observed is up to the [`ThemeBackend`]:
//!
//! - [`FileThemeBackend`] persists the choice to a file and follows a
//!   [`SystemAppearance`] for `system` mode.
//! - [`ServerThemeBackend`] persists nothing and always renders dark.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Callback for system appearance changes.
pub type AppearanceFn = Arc<dyn Fn(Appearance) + Send + Sync>;

/// Errors from theme parsing and persistence.
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("unknown theme '{value}' (expected light, dark, or system)")]
    InvalidTheme { value: String },

    #[error("IO error persisting theme to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The user's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the system appearance.
    System,
}

impl Theme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            _ => Err(ThemeError::InvalidTheme {
                value: s.to_string(),
            }),
        }
    }
}

/// What is actually rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    Light,
    Dark,
}

impl Appearance {
    #[must_use]
    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }
}

impl fmt::Display for Appearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
        })
    }
}

impl From<Appearance> for Theme {
    fn from(appearance: Appearance) -> Self {
        match appearance {
            Appearance::Light => Self::Light,
            Appearance::Dark => Self::Dark,
        }
    }
}

/// Handle for a change listener; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, AppearanceFn)>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, AppearanceFn)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observable system appearance (the `prefers-color-scheme` of the host).
#[derive(Clone)]
pub struct SystemAppearance {
    current: Arc<RwLock<Appearance>>,
    listeners: Arc<Listeners>,
}

impl SystemAppearance {
    #[must_use]
    pub fn new(initial: Appearance) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
            listeners: Arc::new(Listeners::default()),
        }
    }

    #[must_use]
    pub fn current(&self) -> Appearance {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the appearance and notifies listeners if it changed.
    pub fn set(&self, appearance: Appearance) {
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if *current == appearance {
                return;
            }
            *current = appearance;
        }
        debug!(appearance = %appearance, "system appearance changed");
        let listeners: Vec<AppearanceFn> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in listeners {
            callback(appearance);
        }
    }

    pub fn subscribe(&self, callback: AppearanceFn) -> Subscription {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, callback));
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().retain(|(entry, _)| *entry != id);
            }
        })
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for SystemAppearance {
    fn default() -> Self {
        Self::new(Appearance::Light)
    }
}

impl fmt::Debug for SystemAppearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemAppearance")
            .field("current", &self.current())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Where the theme preference is stored and how the system appearance is read.
pub trait ThemeBackend: Send + Sync {
    /// Stored preference, or the backend's default.
    fn preferred(&self) -> Theme;

    /// Appearance used for [`Theme::System`].
    fn system_appearance(&self) -> Appearance;

    /// Stores the preference.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Io`] when the preference cannot be written.
    fn persist(&self, theme: Theme) -> Result<(), ThemeError>;

    /// Calls `callback` whenever the system appearance changes.
    fn on_system_change(&self, callback: AppearanceFn) -> Subscription;
}

/// Persists the preference as a single word in a file.
#[derive(Debug, Clone)]
pub struct FileThemeBackend {
    path: PathBuf,
    system: SystemAppearance,
}

impl FileThemeBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, system: SystemAppearance) -> Self {
        Self {
            path: path.into(),
            system,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ThemeBackend for FileThemeBackend {
    fn preferred(&self) -> Theme {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents.parse().unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ignoring stored theme");
                Theme::System
            }),
            Err(_) => Theme::System,
        }
    }

    fn system_appearance(&self) -> Appearance {
        self.system.current()
    }

    fn persist(&self, theme: Theme) -> Result<(), ThemeError> {
        let io_error = |source| ThemeError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&self.path, theme.as_str()).map_err(io_error)
    }

    fn on_system_change(&self, callback: AppearanceFn) -> Subscription {
        self.system.subscribe(callback)
    }
}

/// Backend for server-rendered output: always dark, never persists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerThemeBackend;

impl ThemeBackend for ServerThemeBackend {
    fn preferred(&self) -> Theme {
        Theme::Dark
    }

    fn system_appearance(&self) -> Appearance {
        Appearance::Dark
    }

    fn persist(&self, _theme: Theme) -> Result<(), ThemeError> {
        Ok(())
    }

    fn on_system_change(&self, _callback: AppearanceFn) -> Subscription {
        Subscription::noop()
    }
}

#[derive(Debug)]
struct ThemeState {
    theme: Theme,
    applied: Option<Appearance>,
}

/// Selected theme plus the appearance currently applied.
pub struct ThemeManager {
    backend: Arc<dyn ThemeBackend>,
    state: Arc<Mutex<ThemeState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ThemeManager {
    /// Loads the stored preference from `backend`. Nothing is applied until
    /// [`init`](Self::init) or [`set_theme`](Self::set_theme).
    #[must_use]
    pub fn new(backend: Arc<dyn ThemeBackend>) -> Self {
        let theme = backend.preferred();
        Self {
            backend,
            state: Arc::new(Mutex::new(ThemeState {
                theme,
                applied: None,
            })),
            subscription: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn theme(&self) -> Theme {
        lock(&self.state).theme
    }

    /// The appearance the current theme resolves to.
    #[must_use]
    pub fn effective(&self) -> Appearance {
        resolve(self.theme(), self.backend.as_ref())
    }

    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.effective().is_dark()
    }

    /// The appearance last applied, `None` before initialization.
    #[must_use]
    pub fn applied(&self) -> Option<Appearance> {
        lock(&self.state).applied
    }

    /// Selects, persists, and applies `theme`.
    ///
    /// # Errors
    ///
    /// Returns the backend's persistence error; the in-memory theme is
    /// updated and applied regardless.
    pub fn set_theme(&self, theme: Theme) -> Result<(), ThemeError> {
        let appearance = resolve(theme, self.backend.as_ref());
        {
            let mut state = lock(&self.state);
            state.theme = theme;
            state.applied = Some(appearance);
        }
        info!(theme = %theme, appearance = %appearance, "theme set");
        self.backend.persist(theme)
    }

    /// Switches between light and dark based on the effective appearance.
    /// A `system` selection becomes an explicit one.
    ///
    /// # Errors
    ///
    /// See [`set_theme`](Self::set_theme).
    pub fn toggle(&self) -> Result<Theme, ThemeError> {
        let next = if self.is_dark() {
            Theme::Light
        } else {
            Theme::Dark
        };
        self.set_theme(next)?;
        Ok(next)
    }

    /// Applies the current theme and starts following system changes while
    /// the selection is `system`. Calling it again replaces the listener.
    pub fn init(&self) {
        let appearance = self.effective();
        lock(&self.state).applied = Some(appearance);

        let state = Arc::clone(&self.state);
        let subscription = self.backend.on_system_change(Arc::new(move |system| {
            let mut state = lock(&state);
            if state.theme == Theme::System {
                state.applied = Some(system);
                debug!(appearance = %system, "applied system appearance");
            }
        }));
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);
        debug!(appearance = %appearance, "theme initialized");
    }
}

impl fmt::Debug for ThemeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThemeManager")
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

fn resolve(theme: Theme, backend: &dyn ThemeBackend) -> Appearance {
    match theme {
        Theme::Light => Appearance::Light,
        Theme::Dark => Appearance::Dark,
        Theme::System => backend.system_appearance(),
    }
}

fn lock(state: &Mutex<ThemeState>) -> MutexGuard<'_, ThemeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use tempfile::TempDir;

    fn file_manager(dir: &TempDir, system: &SystemAppearance) -> ThemeManager {
        let backend = FileThemeBackend::new(dir.path().join("theme"), system.clone());
        ThemeManager::new(Arc::new(backend))
    }

    #[test]
    fn test_theme_parse_and_display() {
        assert_eq!(" Dark\n".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!(Theme::System.to_string(), "system");
        assert!(matches!(
            "sepia".parse::<Theme>(),
            Err(ThemeError::InvalidTheme { .. })
        ));
    }

    #[test]
    fn test_missing_file_defaults_to_system() {
        let dir = TempDir::new().unwrap();
        let system = SystemAppearance::new(Appearance::Dark);
        let manager = file_manager(&dir, &system);

        assert_eq!(manager.theme(), Theme::System);
        assert_eq!(manager.effective(), Appearance::Dark);
        assert_eq!(manager.applied(), None);
    }

    #[test]
    fn test_set_theme_persists_across_managers() {
        let dir = TempDir::new().unwrap();
        let system = SystemAppearance::default();
        file_manager(&dir, &system).set_theme(Theme::Dark).unwrap();

        let reloaded = file_manager(&dir, &system);
        assert_eq!(reloaded.theme(), Theme::Dark);
        assert_eq!(
            fs::read_to_string(dir.path().join("theme")).unwrap(),
            "dark"
        );
    }

    #[test]
    fn test_corrupt_file_falls_back_to_system() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("theme"), "neon").unwrap();
        let manager = file_manager(&dir, &SystemAppearance::default());
        assert_eq!(manager.theme(), Theme::System);
    }

    #[test]
    fn test_toggle_from_system_uses_effective_appearance() {
        let dir = TempDir::new().unwrap();
        let system = SystemAppearance::new(Appearance::Dark);
        let manager = file_manager(&dir, &system);

        assert_eq!(manager.toggle().unwrap(), Theme::Light);
        assert_eq!(manager.applied(), Some(Appearance::Light));
        assert_eq!(manager.toggle().unwrap(), Theme::Dark);
        assert!(manager.is_dark());
    }

    #[test]
    fn test_system_changes_apply_only_in_system_mode() {
        let dir = TempDir::new().unwrap();
        let system = SystemAppearance::new(Appearance::Light);
        let manager = file_manager(&dir, &system);
        manager.init();
        assert_eq!(manager.applied(), Some(Appearance::Light));

        system.set(Appearance::Dark);
        assert_eq!(manager.applied(), Some(Appearance::Dark));

        manager.set_theme(Theme::Light).unwrap();
        system.set(Appearance::Light);
        system.set(Appearance::Dark);
        assert_eq!(manager.applied(), Some(Appearance::Light));
    }

    #[test]
    fn test_reinit_replaces_listener() {
        let dir = TempDir::new().unwrap();
        let system = SystemAppearance::default();
        let manager = file_manager(&dir, &system);
        manager.init();
        manager.init();
        assert_eq!(system.listener_count(), 1);
        drop(manager);
        assert_eq!(system.listener_count(), 0);
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let system = SystemAppearance::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = system.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        system.set(Appearance::Dark);
        system.set(Appearance::Dark);
        subscription.unsubscribe();
        system.set(Appearance::Light);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(system.listener_count(), 0);
    }

    #[test]
    fn test_server_backend_is_dark_and_stateless() {
        let manager = ThemeManager::new(Arc::new(ServerThemeBackend));
        manager.init();
        assert_eq!(manager.theme(), Theme::Dark);
        assert_eq!(manager.applied(), Some(Appearance::Dark));
        manager.set_theme(Theme::Light).unwrap();
        assert_eq!(ThemeManager::new(Arc::new(ServerThemeBackend)).theme(), Theme::Dark);
    }
}
