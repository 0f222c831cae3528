//! Bounded in-memory error log and panic reporting.
//!
//! [`ErrorReporter`] keeps the last [`MAX_ERROR_LOG`] reports for debugging.
//! Reports come from explicit calls, from the task runner in
//! [`retry`](crate::retry), and from the panic hook installed by
//! [`ErrorReporter::install_panic_hook`].

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::user_agent;

/// Maximum number of reports kept; the oldest is dropped first.
pub const MAX_ERROR_LOG: usize = 50;

/// Where an error was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// A named UI or service component.
    Component,
    /// Reported explicitly by application code.
    App,
    /// A panic.
    Unhandled,
    /// A failed background task.
    Task,
}

impl ErrorSource {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Component => "COMPONENT",
            Self::App => "APP",
            Self::Unhandled => "UNHANDLED",
            Self::Task => "TASK",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Name, message, and source chain of a reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetails {
    pub name: String,
    pub message: String,
    /// Messages of `source()` errors, outermost first.
    pub chain: Vec<String>,
}

impl ErrorDetails {
    fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            chain.push(source.to_string());
            current = source.source();
        }
        Self {
            name: short_type_name(error),
            message: error.to_string(),
            chain,
        }
    }
}

/// Circumstances of a reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub source: ErrorSource,
    pub component: Option<String>,
    pub info: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Page or endpoint involved, empty when unknown.
    pub url: String,
    pub user_agent: String,
}

impl ErrorContext {
    #[must_use]
    pub fn new(source: ErrorSource) -> Self {
        Self {
            source,
            component: None,
            info: None,
            timestamp: Utc::now(),
            url: String::new(),
            user_agent: user_agent::default_client_user_agent(),
        }
    }

    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    #[must_use]
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// One entry of the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: ErrorDetails,
    pub context: ErrorContext,
}

/// Shared, bounded error log.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    log: Arc<Mutex<VecDeque<ErrorReport>>>,
}

impl ErrorReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error.
    pub fn report(&self, error: &(dyn StdError + 'static), context: ErrorContext) {
        self.push(ErrorReport {
            error: ErrorDetails::from_error(error),
            context,
        });
    }

    /// Records an error that is only available as text.
    pub fn report_message(
        &self,
        name: impl Into<String>,
        message: impl Into<String>,
        context: ErrorContext,
    ) {
        self.push(ErrorReport {
            error: ErrorDetails {
                name: name.into(),
                message: message.into(),
                chain: Vec::new(),
            },
            context,
        });
    }

    /// Snapshot of the log, oldest first.
    #[must_use]
    pub fn log(&self) -> Vec<ErrorReport> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Records every panic in this log, then runs the previously installed hook.
    pub fn install_panic_hook(&self) {
        let reporter = self.clone();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |hook_info| {
            reporter.record_panic(hook_info);
            previous(hook_info);
        }));
        info!("panic reporting installed");
    }

    fn record_panic(&self, hook_info: &PanicHookInfo<'_>) {
        let payload = hook_info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        let mut context = ErrorContext::new(ErrorSource::Unhandled);
        if let Some(location) = hook_info.location() {
            context = context.info(format!("{}:{}", location.file(), location.line()));
        }
        self.report_message("panic", message, context);
    }

    fn push(&self, report: ErrorReport) {
        log_report(&report);
        let mut log = self.lock();
        log.push_back(report);
        while log.len() > MAX_ERROR_LOG {
            log.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ErrorReport>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_report(report: &ErrorReport) {
    let context = &report.context;
    error!(
        source = %context.source,
        component = context.component.as_deref().unwrap_or(""),
        info = context.info.as_deref().unwrap_or(""),
        url = %context.url,
        error = %report.error.message,
        "[{} Error]",
        context.source
    );
    if !report.error.chain.is_empty() {
        debug!(chain = ?report.error.chain, "error source chain");
    }
}

/// Leading identifier of the error's Debug output, e.g. `Io` or `Timeout`.
fn short_type_name(error: &(dyn StdError + 'static)) -> String {
    // `dyn Error` erases the concrete type; use the leading Debug identifier.
    let debug = format!("{error:?}");
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}
