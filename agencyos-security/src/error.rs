//! Error types for account security operations

use agencyos_errors::{Classify, ErrorKind};
use agencyos_rbac::{RbacError, StoreTimeout};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Security-specific errors
#[derive(Error, Debug)]
pub enum SecurityError {
    /// Permission resolution or template failure
    #[error(transparent)]
    Rbac(#[from] RbacError),

    /// Session token missing, unknown or expired
    #[error("Invalid or expired session")]
    InvalidSession,

    /// Email/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Login guard lockout in effect
    #[error("Too many failed attempts, locked for another {remaining:?}")]
    RateLimited { remaining: Duration },

    /// Correct credentials for a blocked account
    #[error("Account is blocked")]
    AccountBlocked,

    /// Alert not found
    #[error("Alert not found: {alert_id}")]
    AlertNotFound { alert_id: Uuid },

    /// Malformed input
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Store call did not finish in time
    #[error(transparent)]
    StoreTimeout(#[from] StoreTimeout),

    /// Background task running a mutation panicked or was aborted
    #[error("Security task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// Event consumer has shut down
    #[error("Security event channel closed")]
    ChannelClosed,
}

impl SecurityError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl Classify for SecurityError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Rbac(inner) => inner.kind(),
            Self::InvalidSession | Self::InvalidCredentials => ErrorKind::Authentication,
            Self::AccountBlocked => ErrorKind::Permission,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::AlertNotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::StoreTimeout(_) => ErrorKind::Network,
            Self::TaskFailed(_) | Self::ChannelClosed => ErrorKind::Server,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { remaining } => Some(*remaining),
            _ => None,
        }
    }

    fn public_message(&self) -> Option<String> {
        match self {
            Self::Rbac(inner) => inner.public_message(),
            Self::AlertNotFound { .. } => Some("Alert not found".to_string()),
            Self::Validation { message } => Some(message.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyos_errors::kind::AUTHENTICATION_MESSAGE;

    #[test]
    fn test_login_failures_do_not_reveal_cause() {
        let wrong_password = SecurityError::InvalidCredentials.classify();
        let stale_session = SecurityError::InvalidSession.classify();
        assert_eq!(wrong_password.kind, ErrorKind::Authentication);
        assert_eq!(wrong_password.message, AUTHENTICATION_MESSAGE);
        assert_eq!(wrong_password.message, stale_session.message);
    }

    #[test]
    fn test_rate_limit_carries_remaining_seconds() {
        let classified = SecurityError::RateLimited {
            remaining: Duration::from_secs(600),
        }
        .classify();
        assert_eq!(classified.kind, ErrorKind::RateLimit);
        assert_eq!(classified.retry_after_seconds, Some(600));
        assert!(classified.is_retryable());
    }

    #[test]
    fn test_rbac_errors_keep_their_kind() {
        let err: SecurityError = RbacError::TemplateNotFound {
            role: agencyos_rbac::Role::Viewer,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.classify().message.contains("viewer"));
    }

    #[test]
    fn test_internal_failures_classify_as_server() {
        assert_eq!(SecurityError::ChannelClosed.kind(), ErrorKind::Server);
        let timeout: SecurityError = StoreTimeout {
            operation: "get_user",
            limit: Duration::from_secs(5),
        }
        .into();
        assert_eq!(timeout.kind(), ErrorKind::Network);
    }
}
