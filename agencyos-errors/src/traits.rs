//! Shared traits for classifying errors across components

use std::time::Duration;

use crate::kind::{ClassifiedError, ErrorKind};

/// Trait implemented by every component error so it can be mapped onto the taxonomy
pub trait Classify {
    /// Kind this error belongs to
    fn kind(&self) -> ErrorKind;

    /// Remaining lockout, only meaningful for `RateLimit`
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// User-facing message for `Validation` and `NotFound` errors.
    ///
    /// Authentication, permission, network and server errors always use the
    /// generic text of their kind so the reason is never disclosed.
    fn public_message(&self) -> Option<String> {
        None
    }

    /// Convert into the user-facing error
    fn classify(&self) -> ClassifiedError {
        let kind = self.kind();
        let error = match kind {
            ErrorKind::Authentication => ClassifiedError::authentication(),
            ErrorKind::Permission => ClassifiedError::permission(),
            ErrorKind::Network => ClassifiedError::network(),
            ErrorKind::Server => ClassifiedError::server(),
            ErrorKind::RateLimit => {
                ClassifiedError::rate_limited(self.retry_after().unwrap_or_default())
            }
            ErrorKind::Validation | ErrorKind::NotFound => ClassifiedError::new(
                kind,
                self.public_message()
                    .unwrap_or_else(|| "The request could not be processed".to_string()),
            ),
        };

        if matches!(kind, ErrorKind::Server | ErrorKind::Network) {
            tracing::warn!(kind = %kind, "Collaborator failure classified as retryable error");
        }

        error
    }
}

impl Classify for ClassifiedError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn retry_after(&self) -> Option<Duration> {
        ClassifiedError::retry_after(self)
    }

    fn classify(&self) -> ClassifiedError {
        self.clone()
    }
}

impl Classify for tokio::time::error::Elapsed {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Network
    }
}

/// Trait for errors that should be retried
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
    fn retry_delay(&self) -> Option<Duration>;
}

impl<E: Classify> RetryableError for E {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self.kind() {
            ErrorKind::RateLimit => self.retry_after(),
            ErrorKind::Network => Some(Duration::from_millis(250)),
            ErrorKind::Server => Some(Duration::from_secs(1)),
            _ => None,
        }
    }
}

/// Extension for classifying the error side of a `Result` at a boundary
pub trait ClassifyResult<T> {
    fn classified(self) -> Result<T, ClassifiedError>;
}

impl<T, E: Classify> ClassifyResult<T> for Result<T, E> {
    fn classified(self) -> Result<T, ClassifiedError> {
        self.map_err(|e| e.classify())
    }
}
