//! Runtime configuration
//!
//! Everything is read once at startup from flags or environment variables
//! (a `.env` file is honoured) and is read-only afterwards.

use clap::{Parser, ValueEnum};
use secrecy::SecretString;
use std::path::PathBuf;

/// Form intake service
#[derive(Parser, Debug)]
#[command(name = "form-intake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "INTAKE_BIND")]
    pub bind: String,

    /// SQLite database file (created if missing)
    #[arg(long, default_value = "data.db", env = "INTAKE_DATABASE")]
    pub database: PathBuf,

    /// Password required by /export. Leave unset to make export public.
    #[arg(long, env = "EXPORT_PASSWORD", hide_env_values = true)]
    pub export_password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "INTAKE_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "INTAKE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Immutable settings shared with every request handler
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub database: PathBuf,
    pub export_password: Option<SecretString>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Cli {
    pub fn into_config(self) -> AppConfig {
        AppConfig {
            bind: self.bind,
            database: self.database,
            export_password: self
                .export_password
                .filter(|p| !p.is_empty())
                .map(SecretString::new),
            log_level: self.log_level,
            log_format: self.log_format,
        }
    }
}

impl AppConfig {
    /// True when /export accepts requests without a password
    pub fn export_unprotected(&self) -> bool {
        self.export_password.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["form-intake"]);
        assert_eq!(cli.bind, "0.0.0.0:8080");
        assert_eq!(cli.database, PathBuf::from("data.db"));
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_password_flag() {
        let config = Cli::parse_from(["form-intake", "--export-password", "hunter2"]).into_config();
        assert!(!config.export_unprotected());
        assert_eq!(config.export_password.unwrap().expose_secret(), "hunter2");
    }

    #[test]
    fn test_empty_password_means_unprotected() {
        let config = Cli::parse_from(["form-intake", "--export-password", ""]).into_config();
        assert!(config.export_unprotected());
    }

    #[test]
    fn test_json_log_format() {
        let cli = Cli::parse_from(["form-intake", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let config = Cli::parse_from(["form-intake", "--export-password", "hunter2"]).into_config();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
