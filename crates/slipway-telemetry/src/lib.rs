//! Logging infrastructure for Slipway.
//!
//! This crate provides:
//! - Structured logging in compact, pretty or JSON format
//! - Standard event names and logging macros for release runs
//!
//! # Usage
//!
//! ```ignore
//! use slipway_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Json);
//!
//! slipway_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Initialize logging with the given configuration.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)
}
