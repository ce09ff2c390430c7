//! Configuration loading and environment variable handling

use crate::domains::AgencyConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "AGENCYOS".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<AgencyConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AgencyConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<AgencyConfig> {
        let mut config = AgencyConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<AgencyConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut AgencyConfig) -> ConfigResult<()> {
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_login_guard_overrides(&mut config.login_guard)?;
        self.apply_session_overrides(&mut config.session)?;
        self.apply_store_overrides(&mut config.store)?;
        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(level) = self.parse_override("LOG_LEVEL")? {
            config.level = level;
        }
        if let Some(format) = self.parse_override("LOG_FORMAT")? {
            config.format = format;
        }
        Ok(())
    }

    fn apply_login_guard_overrides(
        &self,
        config: &mut crate::domains::login_guard::LoginGuardConfig,
    ) -> ConfigResult<()> {
        if let Some(max) = self.parse_override("LOGIN_MAX_ATTEMPTS")? {
            config.max_attempts = max;
        }
        if let Some(lockout) = self.duration_override("LOGIN_LOCKOUT_MINUTES", 60)? {
            config.lockout_duration = lockout;
        }
        if let Some(window) = self.duration_override("LOGIN_ATTEMPT_WINDOW_MINUTES", 60)? {
            config.attempt_window = window;
        }
        Ok(())
    }

    fn apply_session_overrides(
        &self,
        config: &mut crate::domains::session::SessionConfig,
    ) -> ConfigResult<()> {
        if let Some(idle) = self.duration_override("SESSION_IDLE_TIMEOUT_HOURS", 60 * 60)? {
            config.idle_timeout = idle;
        }
        if let Some(keep) = self.parse_override("SESSION_KEEP_CURRENT_ON_SELF_INVALIDATE")? {
            config.keep_current_session_on_self_invalidate = keep;
        }
        Ok(())
    }

    fn apply_store_overrides(
        &self,
        config: &mut crate::domains::store::StoreConfig,
    ) -> ConfigResult<()> {
        if let Some(millis) = self.parse_override::<u64>("STORE_TIMEOUT_MS")? {
            config.call_timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Parse `<prefix>_<name>` if it is set
    fn parse_override<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let var = format!("{}_{}", self.prefix, name);
        match std::env::var(&var) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::invalid_override(var, raw, e)),
            Err(_) => Ok(None),
        }
    }

    /// Integer override counted in units of `secs_per_unit` seconds
    fn duration_override(&self, name: &str, secs_per_unit: u64) -> ConfigResult<Option<Duration>> {
        let Some(units) = self.parse_override::<u64>(name)? else {
            return Ok(None);
        };
        units
            .checked_mul(secs_per_unit)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| {
                ConfigError::invalid_override(
                    format!("{}_{}", self.prefix, name),
                    units.to_string(),
                    "value is too large",
                )
            })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
