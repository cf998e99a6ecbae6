//! Outbound request description

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use crate::error::{ResourceError, Result};
use crate::uri::Params;

// Re-export HttpMethod from skein-common
pub use skein_common::http::HttpMethod;

/// Header mapping with unique, case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(HeaderMap);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ResourceError::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ResourceError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.0.insert(name, value);
        Ok(())
    }

    /// Builder form of [`Headers::insert`].
    pub fn with(mut self, name: &str, value: &str) -> Result<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// Build from `(name, value)` pairs; later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = Headers::new();
        for (name, value) in pairs {
            headers.insert(name.as_ref(), value.as_ref())?;
        }
        Ok(headers)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0
            .remove(name)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `defaults` whose name is not already present.
    pub fn merge_defaults(&mut self, defaults: &Headers) {
        for (name, value) in defaults.0.iter() {
            if !self.0.contains_key(name) {
                self.0.insert(name.clone(), value.clone());
            }
        }
    }

    pub fn as_header_map(&self) -> &HeaderMap {
        &self.0
    }

    pub fn into_header_map(self) -> HeaderMap {
        self.0
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

/// Request body. Every variant can be replayed, so an auth retry resends
/// exactly what the first attempt sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No body
    #[default]
    Empty,
    /// Raw bytes
    Bytes(Bytes),
    /// Raw text
    Text(String),
    /// JSON document
    Json(serde_json::Value),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Bytes(b) => b.is_empty(),
            Payload::Text(t) => t.is_empty(),
            Payload::Json(_) => false,
        }
    }

    /// Content type implied by the payload kind, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Payload::Json(_) => Some("application/json"),
            Payload::Text(_) => Some("text/plain; charset=utf-8"),
            Payload::Bytes(_) | Payload::Empty => None,
        }
    }

    /// Serialize the payload for the wire.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Payload::Empty => Ok(Bytes::new()),
            Payload::Bytes(b) => Ok(b.clone()),
            Payload::Text(t) => Ok(Bytes::copy_from_slice(t.as_bytes())),
            Payload::Json(v) => Ok(Bytes::from(serde_json::to_vec(v)?)),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// One outbound request, built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: HttpMethod,
    /// Fully composed URI
    pub uri: String,
    pub headers: Headers,
    pub payload: Payload,
    /// Overrides the transport timeout for this request
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            payload: Payload::Empty,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Arguments of one logical call on a resource.
///
/// # Example
///
/// ```ignore
/// let call = Call::new(HttpMethod::Get)
///     .path("_all_docs")
///     .param("include_docs", "true")
///     .timeout(Duration::from_secs(5));
/// let response = resource.call(call).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Call {
    pub method: HttpMethod,
    pub path: Option<String>,
    pub payload: Payload,
    pub headers: Headers,
    pub params: Params,
    pub timeout: Option<Duration>,
}

impl Call {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            path: None,
            payload: Payload::Empty,
            headers: Headers::new(),
            params: Params::new(),
            timeout: None,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Apply the payload's implied content type unless one is already set.
pub(crate) fn apply_content_type(headers: &mut Headers, payload: &Payload) {
    if let Some(content_type) = payload.content_type() {
        if !headers.0.contains_key(CONTENT_TYPE) {
            headers
                .0
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive_and_unique() {
        let mut headers = Headers::new();
        headers.insert("X-Request-Id", "1").unwrap();
        headers.insert("x-request-id", "2").unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-REQUEST-ID"), Some("2"));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = Headers::new().with("bad header", "v").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidHeader(_)));

        let err = Headers::new().with("x-ok", "line\nbreak").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidHeader(_)));
    }

    #[test]
    fn test_merge_defaults_keeps_call_values() {
        let defaults = Headers::from_pairs([("Accept", "application/json"), ("X-Client", "skein")])
            .unwrap();
        let mut headers = Headers::new().with("accept", "text/plain").unwrap();
        headers.merge_defaults(&defaults);

        assert_eq!(headers.get("accept"), Some("text/plain"));
        assert_eq!(headers.get("x-client"), Some("skein"));
    }

    #[test]
    fn test_payload_bytes_and_content_type() {
        let json = Payload::from(serde_json::json!({"_id": "doc"}));
        assert_eq!(json.content_type(), Some("application/json"));
        assert_eq!(json.to_bytes().unwrap(), Bytes::from_static(br#"{"_id":"doc"}"#));

        let raw = Payload::from(vec![1u8, 2, 3]);
        assert_eq!(raw.content_type(), None);
        assert_eq!(raw.to_bytes().unwrap().len(), 3);

        assert!(Payload::Empty.is_empty());
        assert!(Payload::from("").is_empty());
    }

    #[test]
    fn test_apply_content_type_respects_explicit_header() {
        let mut headers = Headers::new();
        apply_content_type(&mut headers, &Payload::from("hi"));
        assert_eq!(headers.get("content-type"), Some("text/plain; charset=utf-8"));

        let mut headers = Headers::new().with("Content-Type", "application/x-ndjson").unwrap();
        apply_content_type(&mut headers, &Payload::Json(serde_json::json!([])));
        assert_eq!(headers.get("content-type"), Some("application/x-ndjson"));
    }

    #[test]
    fn test_call_builder() {
        let call = Call::new(HttpMethod::Put)
            .path("db/doc")
            .payload("body")
            .param("rev", "1-abc")
            .timeout(Duration::from_secs(3));

        assert_eq!(call.method, HttpMethod::Put);
        assert_eq!(call.path.as_deref(), Some("db/doc"));
        assert_eq!(call.params.get("rev"), Some("1-abc"));
        assert_eq!(call.timeout, Some(Duration::from_secs(3)));
    }
}
