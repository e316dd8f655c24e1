//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events. Binaries embedding the
//! gateway can call one of the `init_*` helpers to install a subscriber.
//!
//! ```rust,no_run
//! use infergate::telemetry::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let config = SubscriberConfig::builder()
//!     .log_level(tracing::Level::DEBUG)
//!     .output_format(OutputFormat::Json)
//!     .build();
//! let _guard = init_subscriber(config)?;
//! # Ok::<(), infergate::GatewayError>(())
//! ```

use crate::error::{GatewayError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    Json,
    /// Single-line JSON
    JsonCompact,
}

/// Configuration for tracing subscriber
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Write to this file instead of stdout
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Create a debug configuration
    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            ..Self::default()
        }
    }

    /// Create a production configuration
    pub fn production(log_file: PathBuf) -> Self {
        Self {
            log_level: tracing::Level::WARN,
            output_format: OutputFormat::Json,
            log_file: Some(log_file),
        }
    }

    fn filter(&self) -> EnvFilter {
        let level = self.log_level.as_str().to_lowercase();
        EnvFilter::new(format!("infergate={level}"))
    }
}

/// Builder for SubscriberConfig
#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from a string
    pub fn log_level_str(mut self, level: &str) -> Result<Self> {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                return Err(GatewayError::ConfigurationError(format!(
                    "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
                )));
            }
        };
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            log_file: self.log_file,
        }
    }
}

/// Initialize tracing subscriber with the given configuration
///
/// Returns a [`WorkerGuard`] when logging to a file; keep it alive for as
/// long as logs should be flushed. Installing a subscriber when one is
/// already set is not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.filter();
    let (writer, guard) = make_writer(&config)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let init_result = match config.output_format {
        OutputFormat::Json => builder
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => builder
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .flatten_event(true)
            .try_init(),
        OutputFormat::Text => builder.with_ansi(config.log_file.is_none()).try_init(),
    };

    match init_result {
        Ok(()) => Ok(guard),
        Err(e) => {
            let error_msg = e.to_string();
            if error_msg.contains("global default trace dispatcher has already been set") {
                // Tracing is already initialized, which is fine
                Ok(None)
            } else {
                Err(GatewayError::ConfigurationError(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        }
    }
}

/// Stdout, or a non-blocking file appender plus its flush guard.
fn make_writer(config: &SubscriberConfig) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    let Some(path) = &config.log_file else {
        return Ok((BoxMakeWriter::new(std::io::stdout), None));
    };
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path.file_name().ok_or_else(|| {
        GatewayError::ConfigurationError(format!(
            "log file path has no file name: {}",
            path.display()
        ))
    })?;
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), Some(guard)))
}

/// Initialize tracing subscriber with default configuration
pub fn init_default() -> Result<Option<WorkerGuard>> {
    init_subscriber(SubscriberConfig::default())
}

/// Initialize tracing subscriber from environment variables
///
/// - `INFERGATE_LOG_LEVEL`: trace, debug, info, warn, error
/// - `INFERGATE_LOG_FORMAT`: text, json, json-compact
/// - `INFERGATE_LOG_FILE`: log file path
pub fn init_from_env() -> Result<Option<WorkerGuard>> {
    init_subscriber(config_from_env(|key| std::env::var(key).ok())?)
}

fn config_from_env(var: impl Fn(&str) -> Option<String>) -> Result<SubscriberConfig> {
    let mut builder = SubscriberConfig::builder();

    if let Some(level) = var("INFERGATE_LOG_LEVEL") {
        builder = builder.log_level_str(&level)?;
    }

    if let Some(format) = var("INFERGATE_LOG_FORMAT") {
        let output_format = match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "json-compact" => OutputFormat::JsonCompact,
            "text" => OutputFormat::Text,
            _ => {
                return Err(GatewayError::ConfigurationError(format!(
                    "Invalid log format: {format}. Valid options: text, json, json-compact"
                )));
            }
        };
        builder = builder.output_format(output_format);
    }

    if let Some(file_path) = var("INFERGATE_LOG_FILE") {
        builder = builder.log_file(PathBuf::from(file_path));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_config_parses_known_values() {
        let config = config_from_env(|key| match key {
            "INFERGATE_LOG_LEVEL" => Some("DEBUG".into()),
            "INFERGATE_LOG_FORMAT" => Some("json-compact".into()),
            _ => None,
        })
        .expect("valid");
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.output_format, OutputFormat::JsonCompact);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn env_config_rejects_unknown_format() {
        let err = config_from_env(|key| (key == "INFERGATE_LOG_FORMAT").then(|| "xml".into()))
            .expect_err("invalid");
        assert!(matches!(err, GatewayError::ConfigurationError(_)));
    }

    #[test]
    fn file_logging_uses_a_flushing_guard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SubscriberConfig::production(dir.path().join("gateway.log"));
        let (_writer, guard) = make_writer(&config).expect("writer");
        assert!(guard.is_some());

        let (_writer, guard) = make_writer(&SubscriberConfig::default()).expect("writer");
        assert!(guard.is_none());
    }
}
