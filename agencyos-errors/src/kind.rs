//! The fixed error taxonomy and its user-facing representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Generic message for missing or expired sessions. Never varies with the cause.
pub const AUTHENTICATION_MESSAGE: &str = "Authentication required";

/// Generic message for denied operations. Never varies with the cause.
pub const PERMISSION_MESSAGE: &str = "You do not have permission to perform this action";

/// Error kinds every failure in the subsystem maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient transport failure
    Network,
    /// Missing or expired session
    Authentication,
    /// Authenticated but lacking the required derived capability
    Permission,
    /// Login guard lockout in effect
    RateLimit,
    /// Malformed input
    Validation,
    /// Referenced user, tenant or alert does not exist
    NotFound,
    /// Unexpected collaborator failure
    Server,
}

impl ErrorKind {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::RateLimit | ErrorKind::Server)
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::RateLimit => "RATE_LIMITED",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Server => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the REST layer answers with
    pub fn http_status_code(&self) -> u16 {
        match self {
            ErrorKind::Network => 503,
            ErrorKind::Authentication => 401,
            ErrorKind::Permission => 403,
            ErrorKind::RateLimit => 429,
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Server => 500,
        }
    }

    /// User-friendly suggestions for this kind
    pub fn default_suggestions(&self) -> Vec<String> {
        match self {
            ErrorKind::Network => vec![
                "Check your network connection".to_string(),
                "Retry the operation".to_string(),
            ],
            ErrorKind::Authentication => vec!["Sign in again".to_string()],
            ErrorKind::Permission => vec![
                "Contact an agency administrator if you need access".to_string(),
            ],
            ErrorKind::RateLimit => vec![
                "Wait for the lockout window to elapse before trying again".to_string(),
            ],
            ErrorKind::Validation => vec!["Check your input format and values".to_string()],
            ErrorKind::NotFound => vec!["Verify the identifier and try again".to_string()],
            ErrorKind::Server => vec![
                "This is likely a temporary issue".to_string(),
                "Please try again later".to_string(),
            ],
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Server => "server",
        };
        f.write_str(label)
    }
}

/// A failure after classification, safe to hand to an end user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Remaining lockout for `RateLimit` errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_seconds: None,
            timestamp: Utc::now(),
        }
    }

    pub fn authentication() -> Self {
        Self::new(ErrorKind::Authentication, AUTHENTICATION_MESSAGE)
    }

    pub fn permission() -> Self {
        Self::new(ErrorKind::Permission, PERMISSION_MESSAGE)
    }

    /// Lockout error carrying the remaining window so clients can show a countdown
    pub fn rate_limited(remaining: Duration) -> Self {
        let seconds = remaining.as_secs().max(1);
        let mut error = Self::new(
            ErrorKind::RateLimit,
            format!("Too many failed attempts. Try again in {} seconds", seconds),
        );
        error.retry_after_seconds = Some(seconds);
        error
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{} not found", what))
    }

    pub fn network() -> Self {
        Self::new(ErrorKind::Network, "A temporary network error occurred")
    }

    pub fn server() -> Self {
        Self::new(ErrorKind::Server, "An internal error occurred")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_seconds.map(Duration::from_secs)
    }
}
