//! Declarative status-code policies for failed API responses.
//!
//! Each HTTP error status maps to a [`StatusPolicy`] record naming the toast
//! to show and the session actions to run. The client evaluates the record
//! generically instead of branching per status.

use crate::notify::ToastKind;

/// Session side effect attached to a status policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Drop the stored bearer token.
    ClearAuth,
    /// Remember the current path and navigate to the login page.
    RedirectLogin,
}

/// What the client does when a response carries a given error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Toast title.
    pub title: &'static str,
    /// Toast body used when the server sent no usable message. Empty means
    /// "derive from the status" via [`friendly_error_message`].
    pub message: &'static str,
    /// Toast severity.
    pub level: ToastKind,
    /// Whether the server's `message` field replaces [`message`](Self::message).
    pub prefer_server_message: bool,
    /// Session actions, run in order.
    pub actions: &'static [PolicyAction],
}

impl StatusPolicy {
    /// Resolves the toast body for a response with the given status.
    #[must_use]
    pub fn resolve_message(&self, status: u16, server_message: Option<&str>) -> String {
        match server_message.filter(|m| !m.is_empty()) {
            Some(message) if self.prefer_server_message => message.to_string(),
            _ if self.message.is_empty() => {
                friendly_error_message(Some(status), Some(REQUEST_FAILED.title))
            }
            _ => self.message.to_string(),
        }
    }

    /// Returns true when the policy runs `action`.
    #[must_use]
    pub fn has_action(&self, action: PolicyAction) -> bool {
        self.actions.contains(&action)
    }
}

const UNAUTHORIZED: StatusPolicy = StatusPolicy {
    title: "Session expired",
    message: "Please sign in again",
    level: ToastKind::Warning,
    prefer_server_message: false,
    actions: &[PolicyAction::ClearAuth, PolicyAction::RedirectLogin],
};

const FORBIDDEN: StatusPolicy = StatusPolicy {
    title: "Permission denied",
    message: "You are not allowed to perform this action",
    level: ToastKind::Error,
    prefer_server_message: false,
    actions: &[],
};

const NOT_FOUND: StatusPolicy = StatusPolicy {
    title: "Not found",
    message: "The requested data does not exist or has been removed",
    level: ToastKind::Error,
    prefer_server_message: false,
    actions: &[],
};

const UNPROCESSABLE: StatusPolicy = StatusPolicy {
    title: "Validation failed",
    message: "Please check the submitted data",
    level: ToastKind::Warning,
    prefer_server_message: true,
    actions: &[],
};

const TOO_MANY_REQUESTS: StatusPolicy = StatusPolicy {
    title: "Too many requests",
    message: "Please try again later",
    level: ToastKind::Warning,
    prefer_server_message: false,
    actions: &[],
};

const SERVER_ERROR: StatusPolicy = StatusPolicy {
    title: "Server error",
    message: "The server ran into a problem, please try again later",
    level: ToastKind::Error,
    prefer_server_message: false,
    actions: &[],
};

const GATEWAY_TIMEOUT: StatusPolicy = StatusPolicy {
    title: "Request timed out",
    message: "The server took too long to respond, please try again later",
    level: ToastKind::Error,
    prefer_server_message: false,
    actions: &[],
};

const REQUEST_FAILED: StatusPolicy = StatusPolicy {
    title: "Request failed",
    message: "",
    level: ToastKind::Error,
    prefer_server_message: true,
    actions: &[],
};

/// Looks up the policy for an HTTP error status.
///
/// Statuses without a dedicated entry fall back to a generic "Request failed"
/// policy whose body is the server message or the friendly message for the
/// status (see [`friendly_error_message`]).
#[must_use]
pub fn policy_for(status: u16) -> StatusPolicy {
    match status {
        401 => UNAUTHORIZED,
        403 => FORBIDDEN,
        404 => NOT_FOUND,
        422 => UNPROCESSABLE,
        429 => TOO_MANY_REQUESTS,
        500 | 502 | 503 => SERVER_ERROR,
        504 => GATEWAY_TIMEOUT,
        _ => REQUEST_FAILED,
    }
}

/// Returns a user-facing description of an HTTP status.
///
/// Unknown statuses use `fallback`, then a generic message.
#[must_use]
pub fn friendly_error_message(status: Option<u16>, fallback: Option<&str>) -> String {
    let generic = || fallback.unwrap_or("An unknown error occurred").to_string();
    let Some(status) = status else {
        return generic();
    };
    let message = match status {
        400 => "Invalid request parameters",
        401 => "Please sign in first",
        403 => "Access denied",
        404 => "The requested resource does not exist",
        405 => "Request method not supported",
        408 => "Request timed out",
        409 => "Data conflict",
        410 => "The resource has been removed",
        413 => "Uploaded file is too large",
        422 => "Data validation failed",
        429 => "Too many requests, please try again later",
        500 => "Internal server error",
        502 => "Bad gateway",
        503 => "Service temporarily unavailable",
        504 => "Gateway timeout",
        _ => return generic(),
    };
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_clears_auth_and_redirects() {
        let policy = policy_for(401);
        assert!(policy.has_action(PolicyAction::ClearAuth));
        assert!(policy.has_action(PolicyAction::RedirectLogin));
        assert_eq!(policy.level, ToastKind::Warning);
    }

    #[test]
    fn test_forbidden_and_not_found_have_no_actions() {
        for status in [403, 404, 429, 500, 504] {
            assert!(policy_for(status).actions.is_empty(), "status {status}");
        }
    }

    #[test]
    fn test_server_error_statuses_share_policy() {
        assert_eq!(policy_for(500), policy_for(502));
        assert_eq!(policy_for(502), policy_for(503));
        assert_ne!(policy_for(503), policy_for(504));
    }

    #[test]
    fn test_validation_prefers_server_message() {
        let policy = policy_for(422);
        assert_eq!(policy.resolve_message(422, Some("email is required")), "email is required");
        assert_eq!(policy.resolve_message(422, Some("")), "Please check the submitted data");
        assert_eq!(policy.resolve_message(422, None), "Please check the submitted data");
    }

    #[test]
    fn test_fixed_message_ignores_server_message() {
        let policy = policy_for(403);
        assert_eq!(
            policy.resolve_message(403, Some("internal detail")),
            "You are not allowed to perform this action"
        );
    }

    #[test]
    fn test_unknown_status_uses_generic_policy() {
        let policy = policy_for(418);
        assert_eq!(policy.title, "Request failed");
        assert_eq!(policy.level, ToastKind::Error);
        assert_eq!(policy.resolve_message(418, Some("short and stout")), "short and stout");
        assert_eq!(policy.resolve_message(418, None), "Request failed");
        assert_eq!(policy.resolve_message(409, None), "Data conflict");
    }

    #[test]
    fn test_friendly_messages() {
        assert_eq!(friendly_error_message(Some(404), None), "The requested resource does not exist");
        assert_eq!(friendly_error_message(Some(413), Some("x")), "Uploaded file is too large");
        assert_eq!(friendly_error_message(Some(418), Some("teapot")), "teapot");
        assert_eq!(friendly_error_message(None, None), "An unknown error occurred");
        assert_eq!(friendly_error_message(None, Some("boom")), "boom");
    }
}
