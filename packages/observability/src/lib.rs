//! # Observability
//!
//! Centralized logging layer for WebFront services.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Every event is written as one
//! JSON object per line to a central append-only file:
//! `~/.webfront/logs/dev.jsonl`
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "webfront".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{default_log_path, CentralLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "webfront", "functions").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.webfront/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Falls back to stderr-only output when the central log file cannot be
/// opened, so a read-only home directory never prevents startup.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let log_path = config.log_path.clone().or_else(default_log_path);

    let json_layer = log_path
        .as_ref()
        .and_then(|path| match CentralLogWriter::new(path) {
            Ok(writer) => Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory::new(writer),
            )),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        });
    let file_enabled = json_layer.is_some();

    let stderr_layer = if config.also_stderr || !file_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let _ = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter())))
        .with(stderr_layer.map(|l| l.with_filter(env_filter())))
        .try_init();

    if let Some(path) = log_path.filter(|_| file_enabled) {
        tracing::info!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        );
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
