use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

use crate::constants::{API_KEY_HEADER, JSON_MIME};
use crate::error::ServiceError;

/// Outgoing request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Bytes sent as-is
    Raw(Bytes),
    /// Text sent as-is
    Text(String),
    /// Structured value, serialized as JSON when the request is sent
    Json(serde_json::Value),
}

impl RequestBody {
    /// Converts any serde-serializable value into a JSON body.
    ///
    /// Path fields should use [`crate::ResolvedPath`] or
    /// [`crate::serialize_resolved_path`] to be sent as absolute
    /// forward-slash paths.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ServiceError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| ServiceError::body_serialize(e.to_string()))
    }

    /// Content type implied by the body kind when the caller sets none
    pub(crate) fn implied_content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Json(_) => Some(JSON_MIME),
            _ => None,
        }
    }

    pub(crate) fn encode(self) -> Result<Bytes, ServiceError> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Raw(bytes) => Ok(bytes),
            RequestBody::Text(text) => Ok(Bytes::from(text)),
            RequestBody::Json(value) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(|e| ServiceError::body_serialize(e.to_string())),
        }
    }
}

/// A request against the service, relative to its base path.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Path appended to the client's base path, e.g. `/items/abc`
    pub path: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub content_type: Option<String>,
    /// Hand the unread body back to the caller instead of decoding it
    pub stream: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RequestSpec {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            content_type: None,
            stream: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Sets a JSON body and the JSON content type
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ServiceError> {
        self.body = RequestBody::json(value)?;
        self.content_type = Some(JSON_MIME.to_string());
        Ok(self)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = RequestBody::Text(text.into());
        self
    }

    pub fn raw(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Raw(bytes.into());
        self
    }

    /// Sets the `content-type` header.
    ///
    /// The header does not change how the body is encoded: only
    /// [`RequestBody::Json`] is serialized. A `Text` or `Empty` body sent as
    /// `application/json` goes out unchanged, so `"abc"` is not quoted and an
    /// empty body is not turned into `null`. Use [`RequestSpec::json`] to send
    /// a JSON string or `null`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Content type sent with the request: explicit first, then implied by the body
    pub fn effective_content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| self.body.implied_content_type())
    }
}

/// Merges caller headers with the ones every request carries.
pub(crate) fn prepare_headers(
    spec: &RequestSpec,
    project_key: &str,
    keep_alive: bool,
    authority: &str,
) -> Result<HeaderMap, ServiceError> {
    let mut headers = spec.headers.clone();
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_str(project_key).map_err(http::Error::from)?,
    );

    if let Some(content_type) = spec.effective_content_type() {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(http::Error::from)?,
        );
    }

    if !keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    if !headers.contains_key(HOST) {
        headers.insert(
            HOST,
            HeaderValue::from_str(authority).map_err(http::Error::from)?,
        );
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_key_and_host_always_set() {
        let spec = RequestSpec::get("/items/a");
        let headers = prepare_headers(&spec, "key_abc", true, "database.example.com").unwrap();

        assert_eq!(headers.get("x-api-key").unwrap(), "key_abc");
        assert_eq!(headers.get(HOST).unwrap(), "database.example.com");
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert!(headers.get(CONNECTION).is_none());
    }

    #[test]
    fn test_connection_close_without_keep_alive() {
        let spec = RequestSpec::get("/items/a");
        let headers = prepare_headers(&spec, "key_abc", false, "host").unwrap();
        assert_eq!(headers.get(CONNECTION).unwrap(), "close");
    }

    #[test]
    fn test_caller_api_key_is_overridden() {
        let spec = RequestSpec::get("/items/a").header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static("spoofed"),
        );
        let headers = prepare_headers(&spec, "key_abc", true, "host").unwrap();

        assert_eq!(headers.get_all(API_KEY_HEADER).iter().count(), 1);
        assert_eq!(headers.get(API_KEY_HEADER).unwrap(), "key_abc");
    }

    #[test]
    fn test_caller_headers_preserved() {
        let spec = RequestSpec::get("/files").header(
            HeaderName::from_static("range"),
            HeaderValue::from_static("bytes=0-9"),
        );
        let headers = prepare_headers(&spec, "key", true, "host").unwrap();
        assert_eq!(headers.get("range").unwrap(), "bytes=0-9");
    }

    #[test]
    fn test_json_body_implies_content_type() {
        let spec = RequestSpec::put("/items").body(RequestBody::Json(json!({"key": "a"})));
        let headers = prepare_headers(&spec, "key", true, "host").unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), JSON_MIME);
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let spec = RequestSpec::post("/files")
            .raw(Bytes::from_static(b"\x00\x01"))
            .content_type("application/octet-stream");
        let headers = prepare_headers(&spec, "key", true, "host").unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/octet-stream");
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let spec = RequestSpec::get("/items");
        let result = prepare_headers(&spec, "bad\nkey", true, "host");
        assert!(matches!(result, Err(ServiceError::InvalidRequest(_))));
    }

    #[test]
    fn test_body_encoding() {
        assert_eq!(RequestBody::Empty.encode().unwrap(), Bytes::new());
        assert_eq!(
            RequestBody::Text("plain".to_string()).encode().unwrap(),
            Bytes::from_static(b"plain")
        );
        assert_eq!(
            RequestBody::Raw(Bytes::from_static(b"{not json")).encode().unwrap(),
            Bytes::from_static(b"{not json")
        );

        let encoded = RequestBody::Json(json!({"items": [1, 2]})).encode().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, json!({"items": [1, 2]}));
    }

    #[test]
    fn test_json_content_type_does_not_encode_text() {
        let spec = RequestSpec::post("/items")
            .text("abc")
            .content_type(JSON_MIME);
        assert_eq!(spec.effective_content_type(), Some(JSON_MIME));
        assert_eq!(spec.body.encode().unwrap(), Bytes::from_static(b"abc"));

        let empty = RequestSpec::post("/items").content_type(JSON_MIME);
        assert_eq!(empty.body.encode().unwrap(), Bytes::new());

        let quoted = RequestSpec::post("/items").json("abc").unwrap();
        assert_eq!(quoted.body.encode().unwrap(), Bytes::from_static(b"\"abc\""));
    }

    #[test]
    fn test_json_builder_sets_content_type() {
        let spec = RequestSpec::put("/items")
            .json(&json!({"items": [{"key": "a"}]}))
            .unwrap();
        assert_eq!(spec.content_type.as_deref(), Some(JSON_MIME));
        assert!(matches!(spec.body, RequestBody::Json(_)));
    }

    #[test]
    fn test_json_serialization_failure() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "non-string key");
        let result = RequestBody::json(&map);
        assert!(matches!(result, Err(ServiceError::BodySerialize(_))));
    }
}
