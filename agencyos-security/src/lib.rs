//! Account security for AgencyOS
//!
//! This crate guards the login path and reacts to account-level events:
//! - Failed-login rate limiting and lockout per email and per origin IP
//! - Session creation, validation and invalidation on credential changes
//! - Blocking and unblocking accounts
//! - A security alert feed with a resolution workflow
//!
//! [`SecurityService`] is the boundary every caller goes through; it returns
//! only classified errors.

pub mod alerts;
pub mod error;
pub mod events;
pub mod login_guard;
pub mod middleware;
pub mod service;
pub mod sessions;

pub use alerts::{
    AlertEventType, AlertResolution, AlertScope, AlertSeverity, AlertStore, InMemoryAlertStore,
    NewAlert, SecurityAlert, SecurityAlertPipeline,
};
pub use error::{SecurityError, SecurityResult};
pub use events::{
    EventOutcome, SecurityEvent, SecurityEventConsumer, SecurityEventPayload,
    SecurityEventPublisher,
};
pub use login_guard::{
    AttemptKey, AttemptStore, FailedLoginOutcome, InMemoryAttemptStore, LoginGuard,
    RateLimitDecision,
};
pub use middleware::{authorize_capability, require_session, CurrentUser, RequiredCapability};
pub use service::{
    CredentialVerifier, InMemoryCredentialVerifier, LoginRequest, LoginResponse, SecurityService,
    SecurityStores,
};
pub use sessions::{
    InMemorySessionStore, LoginAuditRecord, Session, SessionMetadata, SessionSecurityManager,
    SessionStore, UserStatus,
};
