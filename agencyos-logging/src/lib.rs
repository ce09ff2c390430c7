//! Structured logging infrastructure for AgencyOS
//!
//! Components log through `tracing` with structured fields (`user_id`,
//! `tenant_id`, `alert_id`, ...). This crate only wires up the subscriber.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing, LoggingGuard};
