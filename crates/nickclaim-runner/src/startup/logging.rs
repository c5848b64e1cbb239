//! Console and rolling file logging.
//!
//! Console output is always on. When a log directory is configured, every
//! event also goes to `nickclaim.log` in that directory, rotated daily.
//! `RUST_LOG` overrides the configured level for both outputs.

use std::path::PathBuf;

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Name of the log file inside the log directory
pub const LOG_FILE_NAME: &str = "nickclaim.log";

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for the rolling log file (None = console only)
    pub log_dir: Option<PathBuf>,
    pub console_level: Level,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_level: Level::INFO,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(log_dir: Option<PathBuf>, level: Level) -> Self {
        Self {
            log_dir,
            console_level: level,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }

    pub fn file_logging(&self) -> bool {
        self.log_dir.is_some()
    }
}

/// Keeps the non-blocking file writer alive; dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Install the global subscriber. Must be called once, before any contender starts.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter(config.console_level));
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let appender = RollingFileAppender::new(config.rotation.into(), log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(env_filter(config.file_level));
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some(log_dir) = &config.log_dir {
        tracing::info!(
            log_dir = %log_dir.display(),
            "File logging initialized: {}",
            LOG_FILE_NAME
        );
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.file_logging());
        assert_eq!(config.console_level, Level::INFO);
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_logging_config_from_config() {
        let config = LoggingConfig::from_config(Some(PathBuf::from("/tmp/nickclaim")), Level::DEBUG);
        assert!(config.file_logging());
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_log_rotation_conversion() {
        assert!(matches!(Rotation::from(LogRotation::Daily), Rotation::DAILY));
        assert!(matches!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY));
        assert!(matches!(Rotation::from(LogRotation::Never), Rotation::NEVER));
    }
}
