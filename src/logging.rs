use crate::constants::{DEFAULT_LOG_DIRECTIVE, DEFAULT_LOG_FILE_NAME};
use crate::error::ServiceError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Sets up logging for processes embedding the client.
///
/// - Always logs to stderr
/// - When `log_file` is given, also logs to a daily rolling file next to it,
///   creating the directory if needed
/// - `RUST_LOG` refines the default `deta_client=info` filter
///
/// Returns the guard of the file writer, which must be kept alive for the
/// duration of the program to ensure logs are flushed.
pub fn setup_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, ServiceError> {
    let stderr_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_filter(env_filter()?);

    let Some(log_file) = log_file else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .map_err(|e| ServiceError::log_setup_error(e.to_string()))?;
        return Ok(None);
    };

    let log_dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE_NAME);

    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            ServiceError::log_setup_error(format!("Failed to create log directory: {e}"))
        })?;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(
            fmt::Layer::new()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter()?),
        )
        .try_init()
        .map_err(|e| ServiceError::log_setup_error(e.to_string()))?;

    Ok(Some(guard))
}

fn env_filter() -> Result<EnvFilter, ServiceError> {
    let directive = DEFAULT_LOG_DIRECTIVE
        .parse()
        .map_err(|e| ServiceError::log_setup_error(format!("Invalid log directive: {e}")))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}
