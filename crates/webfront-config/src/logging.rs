//! Logging initialization.
//!
//! Thin wrapper over the observability crate so every entry point configures
//! logging the same way.

use observability::LogConfig;

/// Initialize logging for the `webfront` service.
///
/// Log level comes from `RUST_LOG` when set, otherwise from `level`.
pub fn init_logging(level: &str) {
    init_logging_for_service("webfront", level);
}

/// Initialize logging with a custom service name and optional log file.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        also_stderr: std::env::var("WEBFRONT_LOG_STDERR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        ..Default::default()
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
