//! Request execution against one service endpoint
//!
//! [`ServiceClient::execute`] prepares headers and body, sends the request
//! with reconnect-on-disconnect, and interprets the response:
//! 200/201/202/207 are successes, 404 is an absent value, anything else is
//! an [`ServiceError::Http`].

pub mod request;
pub mod response;
mod retry;
pub mod serialization;

pub use request::{RequestBody, RequestSpec};
pub use response::{Payload, ResponseStream, ServiceResponse};
pub use serialization::{ResolvedPath, resolve_posix, serialize_resolved_path};

use http::header::CONTENT_TYPE;
use http::{HeaderMap, Response, StatusCode};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use std::io;
use tracing::{debug, instrument, warn};

use crate::config::ServiceConfig;
use crate::constants::JSON_MIME;
use crate::constants::status::{NOT_FOUND, SUCCESS};
use crate::error::ServiceError;
use crate::transport::ConnectionManager;
use request::prepare_headers;
use retry::{PreparedRequest, send_with_retry};

/// Client for one logical service (`/v1/{project_id}/{name}` on one host).
///
/// `execute` takes `&mut self`: a client runs one request at a time. Share a
/// client between tasks behind a `tokio::sync::Mutex`, or give each task its own.
pub struct ServiceClient {
    project_key: String,
    base_path: String,
    managed_runtime: bool,
    connections: ConnectionManager,
}

impl ServiceClient {
    /// Creates a client from a validated configuration. No connection is opened
    /// until the first request.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        Ok(ServiceClient {
            project_key: config.project_key.clone(),
            base_path: config.base_path(),
            managed_runtime: config.managed_runtime,
            connections: ConnectionManager::new(config)?,
        })
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn keep_alive(&self) -> bool {
        self.connections.keep_alive()
    }

    /// Number of connections opened so far
    pub fn connections_opened(&self) -> u64 {
        self.connections.connections_opened()
    }

    pub fn has_connection(&self) -> bool {
        self.connections.has_connection()
    }

    /// Inspects the stored connection. `Err` means its state could not be determined.
    pub fn connection_is_stale(&self) -> io::Result<bool> {
        self.connections.is_stale()
    }

    /// Closes the stored connection; the next request opens a new one.
    pub fn close(&mut self) {
        self.connections.discard();
    }

    /// Sends a request and interprets the response.
    ///
    /// # Returns
    /// * `Ok(ServiceResponse)` - Parsed JSON, raw bytes, an unread stream, or
    ///   `Payload::Absent` for 404
    /// * `Err(ServiceError::Http)` - Any other non-success status
    /// * `Err(ServiceError::RetriesExhausted)` - Every attempt lost its connection
    #[instrument(skip(self, spec), fields(method = %spec.method, path = %spec.path))]
    pub async fn execute(&mut self, spec: RequestSpec) -> Result<ServiceResponse, ServiceError> {
        let url = format!("{}{}", self.base_path, spec.path);
        let headers = prepare_headers(
            &spec,
            &self.project_key,
            self.connections.keep_alive(),
            self.connections.authority(),
        )?;

        self.discard_stale_connection();

        let RequestSpec {
            method,
            body,
            stream,
            ..
        } = spec;
        let prepared = PreparedRequest {
            method,
            url,
            headers,
            body: body.encode()?,
        };

        let response = send_with_retry(&mut self.connections, &prepared).await?;
        self.interpret(response, prepared.url, stream).await
    }

    /// Drops a keep-alive connection the peer has already closed. Only runs in
    /// the managed runtime; an uninspectable socket counts as usable.
    fn discard_stale_connection(&mut self) {
        if !(self.managed_runtime
            && self.connections.keep_alive()
            && self.connections.has_connection())
        {
            return;
        }

        match self.connections.is_stale() {
            Ok(true) => {
                debug!("Stored connection was closed by the peer, discarding it");
                self.connections.discard();
            }
            Ok(false) => {}
            Err(e) => debug!("Could not inspect connection state, assuming it is usable: {e}"),
        }
    }

    async fn interpret(
        &mut self,
        response: Response<Incoming>,
        url: String,
        stream: bool,
    ) -> Result<ServiceResponse, ServiceError> {
        let (parts, body) = response.into_parts();
        let status = parts.status;
        let read_timeout = self.connections.timeout();

        if !SUCCESS.contains(&status.as_u16()) {
            let reason = reason_phrase(status, &parts.extensions);
            let headers = parts.headers.clone();
            // the body must be consumed before the connection can carry another request
            let drained =
                ResponseStream::new(status, parts.headers, body, url.clone(), read_timeout, None)
                    .bytes()
                    .await;
            self.release_connection();
            let drained = drained?;

            if status.as_u16() == NOT_FOUND {
                debug!("{url} not found");
                return Ok(ServiceResponse::new(status, Payload::Absent));
            }

            warn!("HTTP {} - {} (URL: {})", status.as_u16(), reason, url);
            return Err(ServiceError::http_error(
                status.as_u16(),
                reason,
                headers,
                drained,
                url,
            ));
        }

        if stream {
            let connection = if self.connections.keep_alive() {
                None
            } else {
                self.connections.take()
            };
            let stream =
                ResponseStream::new(status, parts.headers, body, url, read_timeout, connection);
            return Ok(ServiceResponse::new(status, Payload::Stream(stream)));
        }

        let is_json = is_json_response(&parts.headers);
        let bytes = ResponseStream::new(status, parts.headers, body, url, read_timeout, None)
            .bytes()
            .await;
        self.release_connection();
        let bytes = bytes?;
        debug!("Response length: {} bytes", bytes.len());

        let payload = if is_json {
            Payload::Json(serde_json::from_slice(&bytes)?)
        } else {
            Payload::Raw(bytes)
        };
        Ok(ServiceResponse::new(status, payload))
    }

    fn release_connection(&mut self) {
        if !self.connections.keep_alive() {
            self.connections.discard();
        }
    }
}

fn is_json_response(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.contains(JSON_MIME))
}

/// Reason phrase as sent by the server, falling back to the canonical one
fn reason_phrase(status: StatusCode, extensions: &http::Extensions) -> String {
    extensions
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown status".to_string())
}
