//! Form intake service
//!
//! Accepts name/email submissions over HTTP, keeps them in a local SQLite
//! file and offers a password-gated CSV export.

pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod store;
pub mod web;

pub use config::{AppConfig, Cli, LogFormat};
pub use error::{AppError, ConfigError, ExportError, StoreError};
pub use store::{Store, Submission};
