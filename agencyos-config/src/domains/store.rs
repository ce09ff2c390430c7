//! Permission store access configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for calls into the external permission, session and alert stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for a single store call; expiry surfaces a retryable network error
    #[serde(
        with = "crate::domains::utils::serde_duration_millis",
        default = "default_call_timeout"
    )]
    pub call_timeout: Duration,

    /// Install the default role templates when the store has none
    #[serde(default = "crate::domains::utils::default_true")]
    pub seed_default_templates: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            seed_default_templates: true,
        }
    }
}

impl Validatable for StoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.call_timeout.as_millis(), "call_timeout", self.domain_name())?;

        if self.call_timeout > Duration::from_secs(60) {
            log::warn!(
                "store.call_timeout of {:?} is unusually long; callers may appear to hang",
                self.call_timeout
            );
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "store"
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}
