//! Login guard (rate limiting and lockout) configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failed-login tracking policy shared by the email and IP counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginGuardConfig {
    /// Failed attempts that lock an identifier
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long a locked identifier stays locked
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_lockout_duration")]
    pub lockout_duration: Duration,

    /// Rolling window after which an idle counter starts over
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_attempt_window")]
    pub attempt_window: Duration,

    /// Raise an abuse alert when an identifier gets locked
    #[serde(default = "crate::domains::utils::default_true")]
    pub alert_on_lockout: bool,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lockout_duration: default_lockout_duration(),
            attempt_window: default_attempt_window(),
            alert_on_lockout: true,
        }
    }
}

impl Validatable for LoginGuardConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.max_attempts, "max_attempts", self.domain_name())?;
        validate_positive(self.lockout_duration.as_secs(), "lockout_duration", self.domain_name())?;
        validate_positive(self.attempt_window.as_secs(), "attempt_window", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "login_guard"
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_attempt_window() -> Duration {
    Duration::from_secs(15 * 60)
}
