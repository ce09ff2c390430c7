//! Errors raised while loading AgencyOS configuration

use std::fmt::Display;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("Configuration file is not valid YAML: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// An environment override could not be parsed
    #[error("Environment override {var}={value:?} rejected: {reason}")]
    InvalidOverride {
        var: String,
        value: String,
        reason: String,
    },

    /// A setting parsed but breaks a rule of its domain
    #[error("Invalid {domain} setting: {message}")]
    InvalidSetting {
        domain: &'static str,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid_override(var: impl Into<String>, value: impl Into<String>, reason: impl Display) -> Self {
        Self::InvalidOverride {
            var: var.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_setting(domain: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            domain,
            message: message.into(),
        }
    }

    /// Config domain the error belongs to, if it came from validation
    pub fn domain(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSetting { domain, .. } => Some(domain),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_error_names_variable_and_value() {
        let err = ConfigError::invalid_override("AGENCYOS_LOGIN_MAX_ATTEMPTS", "many", "not a number");
        let text = err.to_string();
        assert!(text.contains("AGENCYOS_LOGIN_MAX_ATTEMPTS"));
        assert!(text.contains("\"many\""));
        assert_eq!(err.domain(), None);
    }

    #[test]
    fn test_setting_error_keeps_domain() {
        let err = ConfigError::invalid_setting("session", "idle_timeout must be greater than 0");
        assert_eq!(err.domain(), Some("session"));
        assert_eq!(
            err.to_string(),
            "Invalid session setting: idle_timeout must be greater than 0"
        );
    }
}
