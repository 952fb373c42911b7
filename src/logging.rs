//! Structured logging setup using tracing
//!
//! `RUST_LOG` takes precedence over the configured level. Records emitted
//! through the `log` facade (actix-web's access log) land in the same
//! subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::error::ConfigError;

pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}

/// Installs the global subscriber. Fails if called twice.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), ConfigError> {
    let level = parse_log_level(level)?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("form_intake={level},actix_web={level}")));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(ConfigError::LogLevel(_))));
    }
}
