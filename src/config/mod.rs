use crate::constants::{API_VERSION, DEFAULT_HTTP_TIMEOUT_SECONDS, env_vars};
use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub mod validation;

use validation::validate_config;

/// Wire protocol used to reach the service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// HTTPS with platform root certificates
    #[default]
    Tls,
    /// Cleartext HTTP, for local development servers
    Plain,
}

/// Configuration for one logical service endpoint.
/// Handles loading, saving, and validating the client settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Credential sent as `X-Api-Key` on every request
    pub project_key: String,
    /// Project identifier, first segment of the base path
    pub project_id: String,
    /// Service name, second segment of the base path
    pub name: String,
    /// Host to connect to, optionally with an explicit `:port`
    pub host: String,
    /// Timeout in seconds for connecting and for each network read. Defaults to 30 seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
    /// Keep a single connection open between requests
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default)]
    pub transport: Transport,
    /// Running inside the managed runtime; enables the stale socket probe
    #[serde(default = "managed_runtime_from_env")]
    pub managed_runtime: bool,
    /// Path to the log file. If not specified, logs only go to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
}

/// Default HTTP timeout in seconds
fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

fn default_keep_alive() -> bool {
    true
}

fn managed_runtime_from_env() -> bool {
    is_managed_runtime(std::env::var(env_vars::MANAGED_RUNTIME).ok().as_deref())
}

/// Interprets the value of the managed runtime flag. Only the literal `true` enables it.
pub fn is_managed_runtime(value: Option<&str>) -> bool {
    value == Some("true")
}

impl ServiceConfig {
    /// Creates a configuration with default timeout, keep-alive and TLS transport.
    /// The managed runtime flag is read from `DETA_RUNTIME`.
    pub fn new(
        project_key: impl Into<String>,
        project_id: impl Into<String>,
        name: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        ServiceConfig {
            project_key: project_key.into(),
            project_id: project_id.into(),
            name: name.into(),
            host: host.into(),
            timeout_seconds: default_http_timeout(),
            keep_alive: default_keep_alive(),
            transport: Transport::default(),
            managed_runtime: managed_runtime_from_env(),
            log_file_path: None,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_managed_runtime(mut self, managed_runtime: bool) -> Self {
        self.managed_runtime = managed_runtime;
        self
    }

    /// Path prefix shared by every request of this service
    pub fn base_path(&self) -> String {
        format!("/{}/{}/{}", API_VERSION, self.project_id, self.name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Loads configuration from a TOML file, applies environment overrides and validates it.
    ///
    /// # Environment Variables
    /// - `DETA_RUNTIME` - `true` inside the managed runtime
    /// - `DETA_HTTP_TIMEOUT` - Override timeout in seconds
    /// - `DETA_HOST` - Override host
    /// - `DETA_LOG_FILE` - Override log file path
    pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let mut config: ServiceConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating the parent directory if needed.
    pub async fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), ServiceError> {
        let path = path.as_ref();
        let config_dir = path.parent().ok_or_else(|| {
            ServiceError::config_error(format!("Path '{}' has no parent directory", path.display()))
        })?;

        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            fs::create_dir_all(config_dir).await?;
        }
        let content = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Overrides fields from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Overrides fields from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(flag) = lookup(env_vars::MANAGED_RUNTIME) {
            self.managed_runtime = is_managed_runtime(Some(&flag));
        }

        if let Some(timeout) = lookup(env_vars::HTTP_TIMEOUT).and_then(|s| s.parse::<u64>().ok()) {
            self.timeout_seconds = timeout;
        }

        if let Some(host) = lookup(env_vars::HOST) {
            self.host = host;
        }

        if let Some(log_file_path) = lookup(env_vars::LOG_FILE) {
            self.log_file_path = Some(log_file_path);
        }
    }

    /// Validates the configuration settings
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_config(self)
    }
}
