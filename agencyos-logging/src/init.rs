use agencyos_config::domains::logging::{FileRotation, LogFormat, LogLevel, LogTarget};
use agencyos_config::LoggingConfig;
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps background file writers alive; drop it only at shutdown
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    /// Number of non-blocking file writers held open
    pub fn writer_count(&self) -> usize {
        self._guards.len()
    }
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<LoggingGuard> {
    let (layers, guards) = build_layers(config)?;

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::registry()
        .with(layers)
        .with(build_env_filter(&config.level.to_string()))
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(LoggingGuard { _guards: guards })
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    if tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(log_level))
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level only when the configured one is unusable
pub fn build_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_layers(config: &LoggingConfig) -> Result<(Vec<BoxedLayer>, Vec<WorkerGuard>)> {
    let mut layers = Vec::with_capacity(config.targets.len());
    let mut guards = Vec::new();

    for target in &config.targets {
        match target {
            LogTarget::Console { level } => {
                let filter = level_filter(level.unwrap_or(config.level));
                layers.push(fmt_layer(
                    config.format,
                    config.include_location,
                    std::io::stdout,
                    filter,
                ));
            }
            LogTarget::File {
                directory,
                prefix,
                level,
                rotation,
            } => {
                std::fs::create_dir_all(directory)?;
                let appender = match rotation {
                    FileRotation::Never => tracing_appender::rolling::never(directory, prefix),
                    FileRotation::Hourly => tracing_appender::rolling::hourly(directory, prefix),
                    FileRotation::Daily => tracing_appender::rolling::daily(directory, prefix),
                };
                let (writer, guard) = tracing_appender::non_blocking(appender);
                guards.push(guard);

                let filter = level_filter(level.unwrap_or(config.level));
                layers.push(fmt_layer(config.format, config.include_location, writer, filter));
            }
        }
    }

    Ok((layers, guards))
}

fn fmt_layer<W>(format: LogFormat, include_location: bool, writer: W, filter: LevelFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(include_location)
        .with_line_number(include_location);

    match format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Text => base.with_filter(filter).boxed(),
    }
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(level_filter(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(level_filter(LogLevel::Trace), LevelFilter::TRACE);
    }

    #[test]
    fn test_build_layers_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            targets: vec![
                LogTarget::Console { level: None },
                LogTarget::File {
                    directory: dir.path().join("logs").to_string_lossy().into_owned(),
                    prefix: "security.log".to_string(),
                    level: Some(LogLevel::Warn),
                    rotation: FileRotation::Never,
                },
            ],
            ..Default::default()
        };

        let (layers, guards) = build_layers(&config).unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(guards.len(), 1);
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_bad_level_falls_back() {
        // Must not panic on garbage directives
        let _ = build_env_filter("definitely=not=valid=[");
    }
}
