use super::ServiceConfig;
use crate::error::ServiceError;
use std::path::Path;

/// Validates the configuration settings
///
/// # Validation Rules
/// - Project key, project id, service name and host cannot be empty
/// - Project id and service name must be single path segments
/// - Timeout must be at least one second
/// - If log file path is provided, it cannot be empty and its parent must be creatable
pub fn validate_config(config: &ServiceConfig) -> Result<(), ServiceError> {
    if config.project_key.is_empty() {
        return Err(ServiceError::config_error("Project key cannot be empty"));
    }

    validate_path_segment("Project id", &config.project_id)?;
    validate_path_segment("Service name", &config.name)?;

    if config.host.is_empty() {
        return Err(ServiceError::config_error("Host cannot be empty"));
    }

    if config.host.contains("://") || config.host.contains('/') {
        return Err(ServiceError::config_error(
            "Host must be a bare host name, optionally with a port",
        ));
    }

    if config.timeout_seconds == 0 {
        return Err(ServiceError::config_error(
            "Timeout must be at least one second",
        ));
    }

    if let Some(log_path) = &config.log_file_path {
        if log_path.is_empty() {
            return Err(ServiceError::config_error("Log file path cannot be empty"));
        }

        if let Some(parent) = Path::new(log_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::config_error(format!(
                    "Cannot create log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}

fn validate_path_segment(label: &str, value: &str) -> Result<(), ServiceError> {
    if value.is_empty() {
        return Err(ServiceError::config_error(format!("{label} cannot be empty")));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ServiceError::config_error(format!(
            "{label} must be a single path segment: '{value}'"
        )));
    }
    Ok(())
}
