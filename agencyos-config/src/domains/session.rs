//! Session configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session lifetime and invalidation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions without activity for this long are treated as expired
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_idle_timeout")]
    pub idle_timeout: Duration,

    /// When a user invalidates their own sessions, keep the one making the request
    #[serde(default = "crate::domains::utils::default_true")]
    pub keep_current_session_on_self_invalidate: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            keep_current_session_on_self_invalidate: true,
        }
    }
}

impl Validatable for SessionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.idle_timeout.as_secs(), "idle_timeout", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "session"
    }
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}
