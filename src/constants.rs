//! Crate-wide constants
//!
//! Centralizes the protocol values, defaults and environment variable names
//! used by the request layer.

/// Default timeout for connection setup and each network read, in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Media type that triggers JSON body encoding and response decoding
pub const JSON_MIME: &str = "application/json";

/// Header carrying the project key on every request
pub const API_KEY_HEADER: &str = "x-api-key";

/// API version prefix of every service base path
pub const API_VERSION: &str = "v1";

/// Default log filter directive when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "deta_client=info";

/// Default log file name used by the rolling file appender
pub const DEFAULT_LOG_FILE_NAME: &str = "deta_client.log";

/// Status codes treated as success by the request executor
pub mod status {
    /// Statuses whose body is handed back to the caller
    pub const SUCCESS: [u16; 4] = [200, 201, 202, 207];

    /// Status reported as an absent value rather than an error
    pub const NOT_FOUND: u16 = 404;
}

/// Retry configuration
pub mod retry {
    /// Send attempts per request; only disconnect-class failures consume it
    pub const SEND_ATTEMPTS: u8 = 2;
}

/// Transport defaults
pub mod transport {
    /// Port used for TLS connections when the host carries no explicit port
    pub const DEFAULT_TLS_PORT: u16 = 443;

    /// Port used for plain connections when the host carries no explicit port
    pub const DEFAULT_PLAIN_PORT: u16 = 80;

    /// ALPN protocol offered during the TLS handshake
    pub const ALPN_HTTP1: &[u8] = b"http/1.1";

    /// `tcpi_state` value of a socket whose peer has sent FIN
    pub const TCP_CLOSE_WAIT: u8 = 8;
}

/// Environment variable names
pub mod env_vars {
    /// Set to `true` inside the managed (serverless) runtime; enables the stale socket probe
    pub const MANAGED_RUNTIME: &str = "DETA_RUNTIME";

    /// Override for the request timeout in seconds
    pub const HTTP_TIMEOUT: &str = "DETA_HTTP_TIMEOUT";

    /// Override for the service host
    pub const HOST: &str = "DETA_HOST";

    /// Override for the log file path
    pub const LOG_FILE: &str = "DETA_LOG_FILE";
}
