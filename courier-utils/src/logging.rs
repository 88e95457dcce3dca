//! Logging infrastructure for courier
//!
//! Provides unified logging setup using the tracing ecosystem.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, CourierError, Result};

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr (for the update client CLI)
    Stderr,
    /// Log to file (for the registry daemon)
    File,
    /// Log to both stderr and file
    Both,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "courier=debug,tokio=warn")
    pub filter: String,
    /// Include span events (enter/exit)
    pub span_events: bool,
    /// Include file/line in logs
    pub file_line: bool,
    /// Optional custom log file name (defaults to "courier.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Create config for the update client (stderr, quiet by default)
    pub fn client() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("COURIER_LOG").unwrap_or_else(|_| "warn".into()),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }

    /// Create config for the registry daemon (file logging)
    pub fn server() -> Self {
        Self {
            output: LogOutput::File,
            filter: std::env::var("COURIER_LOG").unwrap_or_else(|_| "info".into()),
            span_events: true,
            file_line: true,
            file_name: Some("courier-server.log".into()),
        }
    }

    /// Create config for development (verbose stderr)
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            span_events: true,
            file_line: true,
            file_name: None,
        }
    }
}

/// Initialize logging with default configuration
///
/// Uses COURIER_LOG env var for filter, defaults to "info"
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| CourierError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.span_events {
        fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    } else {
        fmt_layer
    };

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    let file_name = config.file_name.as_deref().unwrap_or("courier.log");

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| CourierError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file(file_name)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| CourierError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file(file_name)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| CourierError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

fn open_log_file(file_name: &str) -> Result<std::fs::File> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|e| CourierError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = log_dir.join(file_name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| CourierError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(!config.span_events);
        assert!(!config.file_line);
    }

    #[test]
    fn test_log_config_server() {
        let config = LogConfig::server();
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file_name, Some("courier-server.log".into()));
        assert!(config.span_events);
        assert!(config.file_line);
    }

    #[test]
    fn test_log_config_client() {
        let config = LogConfig::client();
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(!config.span_events);
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "debug");
        assert!(config.span_events);
    }

    #[test]
    fn test_log_config_clone() {
        let config = LogConfig {
            output: LogOutput::Both,
            filter: "courier=debug,tokio=warn".to_string(),
            span_events: true,
            file_line: true,
            file_name: Some("test.log".into()),
        };
        let cloned = config.clone();
        assert_eq!(config.output, cloned.output);
        assert_eq!(config.filter, cloned.filter);
        assert_eq!(config.file_name, cloned.file_name);
    }

    // Note: init_logging() itself is not exercised here because the
    // tracing subscriber can only be installed once per process and
    // tests share one.
}
