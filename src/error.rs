use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    // Status code errors
    #[error("HTTP error ({status}): {reason} (URL: {url})")]
    Http {
        status: u16,
        reason: String,
        headers: HeaderMap,
        body: Bytes,
        url: String,
    },

    // Transport errors
    #[error("Connection lost after {attempts} attempts: {message} (URL: {url})")]
    RetriesExhausted {
        url: String,
        attempts: u8,
        message: String,
    },

    #[error("Network timeout while talking to: {host}")]
    NetworkTimeout { host: String },

    #[error("Connection failed to: {host} - {message}")]
    NetworkConnection { host: String, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP protocol error: {0}")]
    Protocol(#[from] hyper::Error),

    #[error("Failed to read response body from {url}: {message}")]
    ResponseRead { url: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    // Body encoding and decoding
    #[error("Failed to serialize request body: {0}")]
    BodySerialize(String),

    #[error("Failed to parse API response: {0}")]
    ApiParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Log setup error: {0}")]
    LogSetup(String),
}

impl ServiceError {
    /// Create a configuration error with context
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a log setup error with context
    pub fn log_setup_error(msg: impl Into<String>) -> Self {
        Self::LogSetup(msg.into())
    }

    /// Create an HTTP status error from a drained response
    pub fn http_error(
        status: u16,
        reason: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
        url: impl Into<String>,
    ) -> Self {
        Self::Http {
            status,
            reason: reason.into(),
            headers,
            body,
            url: url.into(),
        }
    }

    /// Create the error reported once every send attempt was lost to a disconnect
    pub fn retries_exhausted(url: impl Into<String>, attempts: u8, message: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Create a network timeout error
    pub fn network_timeout(host: impl Into<String>) -> Self {
        Self::NetworkTimeout { host: host.into() }
    }

    /// Create a network connection error
    pub fn network_connection(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NetworkConnection {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a TLS setup or handshake error
    pub fn tls_error(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a body read error
    pub fn response_read(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResponseRead {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a request body serialization error
    pub fn body_serialize(msg: impl Into<String>) -> Self {
        Self::BodySerialize(msg.into())
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if error is worth retrying at a higher layer (network issues, server errors)
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RetriesExhausted { .. }
            | ServiceError::NetworkTimeout { .. }
            | ServiceError::NetworkConnection { .. } => true,
            ServiceError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Check if every send attempt lost its connection to a disconnect.
    /// Refused connections and timeouts report `false`.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ServiceError::RetriesExhausted { .. })
    }
}
