use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::Body as _;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::ServiceError;
use crate::transport::ConnectionHandle;

/// Interpreted response body.
#[derive(Debug)]
pub enum Payload {
    /// Body of a JSON response, parsed
    Json(serde_json::Value),
    /// Body of any other response, unparsed
    Raw(Bytes),
    /// Unread body of a streaming request
    Stream(ResponseStream),
    /// The resource does not exist (404)
    Absent,
}

/// Result of a request: the status code and its payload.
#[derive(Debug)]
pub struct ServiceResponse {
    status: StatusCode,
    payload: Payload,
}

impl ServiceResponse {
    pub(crate) fn new(status: StatusCode, payload: Payload) -> Self {
        ServiceResponse { status, payload }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.payload, Payload::Absent)
    }

    /// Parsed JSON value, if the response was JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Raw bytes, if the response was neither JSON nor streamed
    pub fn into_bytes(self) -> Option<Bytes> {
        match self.payload {
            Payload::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_stream(self) -> Option<ResponseStream> {
        match self.payload {
            Payload::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Deserializes the payload into `T`. Raw and streamed bodies are parsed
    /// as JSON; an absent resource yields `None`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<Option<T>, ServiceError> {
        let value = match self.payload {
            Payload::Absent => return Ok(None),
            Payload::Json(value) => serde_json::from_value(value)?,
            Payload::Raw(bytes) => serde_json::from_slice(&bytes)?,
            Payload::Stream(stream) => serde_json::from_slice(&stream.bytes().await?)?,
        };
        Ok(Some(value))
    }
}

/// A response whose body has not been read yet.
///
/// Dropping the stream abandons the body. For clients without keep-alive the
/// stream owns the connection and closes it on drop.
pub struct ResponseStream {
    status: StatusCode,
    headers: HeaderMap,
    body: Incoming,
    url: String,
    read_timeout: Duration,
    // declared after `body` so the body is released first
    connection: Option<ConnectionHandle>,
}

impl ResponseStream {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Incoming,
        url: String,
        read_timeout: Duration,
        connection: Option<ConnectionHandle>,
    ) -> Self {
        ResponseStream {
            status,
            headers,
            body,
            url,
            read_timeout,
            connection,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// True once the whole body has been read
    pub fn is_end_stream(&self) -> bool {
        self.body.is_end_stream()
    }

    /// Reads the next chunk of the body, or `None` at the end. Waiting longer
    /// than the read timeout for a chunk is a [`ServiceError::ResponseRead`].
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ServiceError> {
        loop {
            let frame = match timeout(self.read_timeout, self.body.frame()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return Err(ServiceError::response_read(&self.url, e.to_string())),
                Ok(None) => return Ok(None),
                Err(_) => {
                    return Err(ServiceError::response_read(
                        &self.url,
                        format!("no data within {}s", self.read_timeout.as_secs()),
                    ));
                }
            };
            // trailers carry no body data
            if let Ok(data) = frame.into_data()
                && !data.is_empty()
            {
                return Ok(Some(data));
            }
        }
    }

    /// Reads the remaining body to the end.
    pub async fn bytes(mut self) -> Result<Bytes, ServiceError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Abandons the rest of the body and releases the connection.
    pub fn close(self) {}
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("owns_connection", &self.connection.is_some())
            .finish()
    }
}
