//! Resilient request layer for Deta service endpoints
//!
//! This library sends authenticated HTTPS requests to one service host over a
//! single keep-alive connection, recovers from connections the peer closed
//! while the process was frozen, and turns responses into JSON values, raw
//! bytes, unread streams, or an absent value for 404.
//!
//! # Examples
//!
//! ```rust,no_run
//! use deta_client::{RequestSpec, ServiceClient, ServiceConfig, ServiceError};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let config = ServiceConfig::new("project_key", "project_id", "items", "database.deta.sh");
//!     let mut client = ServiceClient::new(&config)?;
//!
//!     let stored = client
//!         .execute(RequestSpec::put("/items").json(&json!({"items": [{"key": "a"}]}))?)
//!         .await?;
//!     println!("stored: {:?}", stored.as_json());
//!
//!     let missing = client.execute(RequestSpec::get("/items/unknown")).await?;
//!     assert!(missing.is_absent());
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{
    Payload, RequestBody, RequestSpec, ResolvedPath, ResponseStream, ServiceClient,
    ServiceResponse, resolve_posix, serialize_resolved_path,
};
pub use config::{ServiceConfig, Transport};
pub use error::ServiceError;
pub use logging::setup_logging;

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
