//! Shared error taxonomy for the AgencyOS access-control subsystem
//!
//! Every failure raised by the permission resolver, the login guard, the
//! session manager or the alert pipeline is classified into exactly one
//! [`ErrorKind`] before it crosses a service boundary. Collaborator-specific
//! error shapes never leak upward; callers only ever see a
//! [`ClassifiedError`].

pub mod kind;
pub mod rest;
pub mod traits;

// Re-export commonly used types
pub use kind::{ClassifiedError, ErrorKind};
pub use rest::RestErrorResponse;
pub use traits::{Classify, ClassifyResult, RetryableError};

/// Result type returned by every boundary operation
pub type ServiceResult<T> = Result<T, ClassifiedError>;
