use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::LoggingConfig;
use crate::error::SyncError;

const DEFAULT_FILTER: &str = "info";

/// Rolling log files in one directory.
pub struct FileLogger {
    log_directory: PathBuf,
    file_prefix: String,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            file_prefix: "template_sync".to_string(),
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.file_prefix = prefix.to_string();
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard), SyncError> {
        std::fs::create_dir_all(&self.log_directory)?;
        let file_appender = RollingFileAppender::new(
            self.rotation.clone(),
            &self.log_directory,
            &self.file_prefix,
        );
        Ok(tracing_appender::non_blocking(file_appender))
    }
}

pub fn parse_rotation(value: &str) -> Result<Rotation, SyncError> {
    match value.to_lowercase().as_str() {
        "daily" => Ok(Rotation::DAILY),
        "hourly" => Ok(Rotation::HOURLY),
        "minutely" => Ok(Rotation::MINUTELY),
        "never" => Ok(Rotation::NEVER),
        other => Err(SyncError::ConfigError(format!(
            "logging.rotation must be daily, hourly, minutely or never, got '{}'",
            other
        ))),
    }
}

/// Install the global subscriber: console output plus, when a directory is
/// configured, a plain-text rolling file. Keep the returned guard alive for
/// the lifetime of the process or buffered file output is lost.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, SyncError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let (writer, guard) = FileLogger::new(dir.clone())
                .with_prefix(&config.file_prefix)
                .with_rotation(parse_rotation(&config.rotation)?)
                .setup_file_logging()?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer()) // Console output
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::ConfigError(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
