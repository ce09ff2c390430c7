//! Domain-driven configuration management for AgencyOS access control
//!
//! Configuration is split by functional domain (logging, login guard,
//! sessions, permission store) with validation, defaults, and environment
//! variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    login_guard::LoginGuardConfig, logging::LoggingConfig, session::SessionConfig,
    store::StoreConfig, AgencyConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
