//! Send-with-retry for a single request
//!
//! Only disconnect-class failures are retried, each time on a fresh
//! connection. Everything else fails the request immediately.

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use std::error::Error as _;
use std::io;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::constants::retry::SEND_ATTEMPTS;
use crate::error::ServiceError;
use crate::transport::ConnectionManager;

/// A fully prepared request that can be rebuilt for every attempt.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl PreparedRequest {
    fn to_request(&self) -> Result<Request<Full<Bytes>>, ServiceError> {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str())
            .body(Full::new(self.body.clone()))?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }
}

enum SendState {
    Attempting { remaining: u8, force_reinit: bool },
    Succeeded(Response<Incoming>),
    Failed { last_error: String },
}

enum AttemptError {
    /// The connection went away underneath the request
    Disconnected(String),
    Fatal(ServiceError),
}

/// Sends the request, reconnecting after a disconnect until the attempt budget is spent.
///
/// Returns once the response head has arrived; the body is left unread.
pub(crate) async fn send_with_retry(
    connections: &mut ConnectionManager,
    request: &PreparedRequest,
) -> Result<Response<Incoming>, ServiceError> {
    let mut state = SendState::Attempting {
        remaining: SEND_ATTEMPTS,
        force_reinit: false,
    };

    loop {
        state = match state {
            SendState::Attempting {
                remaining,
                force_reinit,
            } => match attempt(connections, request, force_reinit).await {
                Ok(response) => SendState::Succeeded(response),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Disconnected(message)) => {
                    let remaining = remaining - 1;
                    if remaining > 0 {
                        warn!(
                            "Connection lost while sending {} {}: {}. Reconnecting ({} attempt(s) left)",
                            request.method, request.url, message, remaining
                        );
                        SendState::Attempting {
                            remaining,
                            force_reinit: true,
                        }
                    } else {
                        SendState::Failed {
                            last_error: message,
                        }
                    }
                }
            },
            SendState::Succeeded(response) => {
                debug!("{} {} -> {}", request.method, request.url, response.status());
                return Ok(response);
            }
            SendState::Failed { last_error } => {
                connections.discard();
                return Err(ServiceError::retries_exhausted(
                    &request.url,
                    SEND_ATTEMPTS,
                    last_error,
                ));
            }
        };
    }
}

async fn attempt(
    connections: &mut ConnectionManager,
    request: &PreparedRequest,
    force_reinit: bool,
) -> Result<Response<Incoming>, AttemptError> {
    let read_timeout = connections.timeout();
    let authority = connections.authority().to_string();
    let outgoing = request.to_request().map_err(AttemptError::Fatal)?;

    let handle = if !connections.keep_alive() || force_reinit {
        connections.replace().await
    } else {
        connections.ensure_connection().await
    }
    .map_err(AttemptError::Fatal)?;

    let result = match timeout(read_timeout, handle.send(outgoing)).await {
        Ok(Ok(response)) => return Ok(response),
        Ok(Err(e)) if is_disconnect(&e) => AttemptError::Disconnected(e.to_string()),
        Ok(Err(e)) => AttemptError::Fatal(e.into()),
        Err(_) => AttemptError::Fatal(ServiceError::network_timeout(authority)),
    };
    // a request that failed mid-exchange leaves the connection unusable
    connections.discard();
    Err(result)
}

/// Peer closed the connection, or it was in no state to take a new request.
pub(crate) fn is_disconnect(error: &hyper::Error) -> bool {
    if error.is_incomplete_message() || error.is_closed() || error.is_canceled() {
        return true;
    }

    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io_error) = inner.downcast_ref::<io::Error>() {
            return is_disconnect_kind(io_error.kind());
        }
        source = inner.source();
    }
    false
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
