use agencyos_config::domains::logging::{FileRotation, LogFormat, LogLevel, LogTarget};
use agencyos_config::LoggingConfig;
use agencyos_logging::{init_logging_from_config, init_simple_tracing};

#[test]
fn test_init_from_config_with_file_target() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        level: LogLevel::Debug,
        format: LogFormat::Json,
        targets: vec![LogTarget::File {
            directory: dir.path().to_string_lossy().into_owned(),
            prefix: "security.log".to_string(),
            level: None,
            rotation: FileRotation::Never,
        }],
        include_location: true,
    };

    let guard = init_logging_from_config(&config).unwrap();
    assert_eq!(guard.writer_count(), 1);

    tracing::info!(user_id = "u-1", "login recorded");

    // A second initialization must not fail
    assert!(init_simple_tracing("info").is_ok());
    drop(guard);
}
