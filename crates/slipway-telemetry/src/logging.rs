//! Structured logging for the release pipeline.
//!
//! Logs go to stderr so that commands printing results (`slipway resolve`)
//! keep stdout clean.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Sets up tracing-subscriber in the configured format, respecting the
/// configured log level unless `RUST_LOG` is set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => init_json_logging(filter),
        LogFormat::Pretty => init_pretty_logging(filter, config.ansi),
        LogFormat::Compact => init_compact_logging(filter, config.ansi),
    }
}

fn init_json_logging(filter: EnvFilter) -> Result<(), TelemetryError> {
    let json_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(false)
        .with_line_number(false)
        .flatten_event(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_pretty_logging(filter: EnvFilter, ansi: bool) -> Result<(), TelemetryError> {
    let pretty_layer = fmt::layer()
        .pretty()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

fn init_compact_logging(filter: EnvFilter, ansi: bool) -> Result<(), TelemetryError> {
    let compact_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .without_time()
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(compact_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })
}

/// Standard log event names.
pub mod events {
    /// A push run started.
    pub const PUSH_STARTED: &str = "push_started";

    /// A release stage completed.
    pub const STAGE_REACHED: &str = "stage_reached";

    /// An external command is about to run.
    pub const COMMAND_STARTED: &str = "command_started";

    /// A non-fatal diagnostic was recorded.
    pub const WARNING_RECORDED: &str = "warning_recorded";

    /// A push run finished successfully.
    pub const PUSH_COMPLETED: &str = "push_completed";

    /// A push run aborted.
    pub const PUSH_FAILED: &str = "push_failed";

    /// The build folder could not be removed.
    pub const CLEANUP_FAILED: &str = "cleanup_failed";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to ensure consistent field naming.
#[macro_export]
macro_rules! log_push_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PUSH_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_stage_reached {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::STAGE_REACHED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_command_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::COMMAND_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_warning_recorded {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::WARNING_RECORDED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_push_completed {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PUSH_COMPLETED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_push_failed {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::PUSH_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_cleanup_failed {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::CLEANUP_FAILED,
            $($field)*
        )
    };
}
