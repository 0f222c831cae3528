//! Fixed-delay retry wrapper and a notifying task runner.
//!
//! Nothing in the crate retries on its own. Callers opt in by running an
//! operation through [`retry_with_delay`] or a [`TaskRunner`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use portal_core::retry::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(2, Duration::from_millis(500));
//! assert_eq!(policy.max_attempts(), 3);
//!
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {reason}");
//!     }
//! }
//! ```

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::api::{ParsedError, friendly_error_message};
use crate::failure::{ErrorContext, ErrorReporter, ErrorSource};
use crate::notify::NotificationService;

/// Default delay between attempts (1 second).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Toast title for failed tasks.
const TASK_FAILED_TITLE: &str = "Operation failed";

/// Decision on whether to run another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry count and the fixed delay between attempts.
///
/// The delay is the same before every retry; there is no backoff and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    retries: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Total attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Decides what happens after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts()))]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts() {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = self.delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// Returns the last error together with the number of attempts made.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_with_delay<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) => match policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "giving up");
                    return (Err(e), attempt);
                }
            },
        }
    }
}

/// Result of [`TaskRunner::execute`].
#[derive(Debug)]
pub struct TaskReport<T, E> {
    pub value: Option<T>,
    pub error: Option<E>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl<T, E> TaskReport<T, E> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Retries made after the first attempt.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Runs fallible async work with retries, an error toast, and error reporting.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    notifier: NotificationService,
    policy: RetryPolicy,
    show_error: bool,
    reporter: Option<ErrorReporter>,
}

impl TaskRunner {
    /// Runner without retries that shows an error toast on failure.
    #[must_use]
    pub fn new(notifier: NotificationService) -> Self {
        Self {
            notifier,
            policy: RetryPolicy::none(),
            show_error: true,
            reporter: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn show_error(mut self, show_error: bool) -> Self {
        self.show_error = show_error;
        self
    }

    /// Also records final failures in `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Runs `operation` under the retry policy.
    ///
    /// On final failure the error is reported, and, unless disabled, shown as
    /// an "Operation failed" toast with the friendly message for its status.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> TaskReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
        for<'a> ParsedError: From<&'a E>,
    {
        let (result, attempts) = retry_with_delay(self.policy, operation).await;
        match result {
            Ok(value) => TaskReport {
                value: Some(value),
                error: None,
                attempts,
            },
            Err(e) => {
                if let Some(reporter) = &self.reporter {
                    reporter.report(
                        &e,
                        ErrorContext::new(ErrorSource::Task).info(format!("after {attempts} attempt(s)")),
                    );
                }
                if self.show_error {
                    let parsed = ParsedError::from(&e);
                    let message = friendly_error_message(parsed.status, Some(&parsed.message));
                    self.notifier.error(TASK_FAILED_TITLE, Some(&message));
                }
                TaskReport {
                    value: None,
                    error: Some(e),
                    attempts,
                }
            }
        }
    }
}
