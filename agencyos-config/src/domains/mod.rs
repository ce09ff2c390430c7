//! Domain-specific configuration modules

pub mod logging;
pub mod login_guard;
pub mod session;
pub mod store;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgencyConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Failed-login rate limiting and lockout
    #[serde(default)]
    pub login_guard: login_guard::LoginGuardConfig,

    /// Session lifetime and invalidation policy
    #[serde(default)]
    pub session: session::SessionConfig,

    /// Permission store access
    #[serde(default)]
    pub store: store::StoreConfig,
}

impl AgencyConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.logging.validate()?;
        self.login_guard.validate()?;
        self.session.validate()?;
        self.store.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = AgencyConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
