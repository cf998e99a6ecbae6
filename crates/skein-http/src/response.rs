//! HTTP response types

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use skein_common::http::HttpResponseLike;

use crate::error::{ResourceError, Result};

/// Everything a transport reads off the wire for one exchange.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status_code: u16,
    /// Header names are lower-cased; repeated headers are joined with ", "
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Final URL (may differ from the request URL after redirects)
    pub url: String,
    pub version: String,
    pub latency_ms: u64,
}

/// HTTP response with a body that can be taken once
#[derive(Debug)]
pub struct Response {
    status_code: u16,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    url: String,
    version: String,
    latency_ms: u64,
}

impl Response {
    pub fn from_parts(parts: ResponseParts) -> Self {
        Self {
            status_code: parts.status_code,
            headers: parts.headers,
            body: Some(parts.body),
            url: parts.url,
            version: parts.version,
            latency_ms: parts.latency_ms,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get latency as Duration
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Returns true once the body has been taken.
    pub fn is_body_consumed(&self) -> bool {
        self.body.is_none()
    }

    /// Take the raw body. Fails with [`ResourceError::BodyConsumed`] on a
    /// second call.
    pub fn body_bytes(&mut self) -> Result<Bytes> {
        self.body.take().ok_or(ResourceError::BodyConsumed)
    }

    /// Take the body as UTF-8 text.
    pub fn body_string(&mut self) -> Result<String> {
        let body = self.body_bytes()?;
        String::from_utf8(body.to_vec())
            .map_err(|e| ResourceError::ParserError(format!("Invalid UTF-8 in response: {}", e)))
    }

    /// Take the body and deserialize it as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        let body = self.body_bytes()?;
        serde_json::from_slice(&body)
            .map_err(|e| ResourceError::ParserError(format!("Failed to parse JSON: {}", e)))
    }

    /// Check if content type is JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    /// Body text for error reports; never fails.
    pub(crate) fn take_error_body(&mut self) -> String {
        self.body
            .take()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl HttpResponseLike for Response {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

/// Builds the [`Response`] handed back to callers from raw transport output.
pub trait ResponseFactory: Send + Sync {
    fn build(&self, parts: ResponseParts) -> Response;
}

/// Wraps the parts unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponseFactory;

impl ResponseFactory for DefaultResponseFactory {
    fn build(&self, parts: ResponseParts) -> Response {
        Response::from_parts(parts)
    }
}

impl fmt::Debug for dyn ResponseFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseFactory")
    }
}

/// Builder for creating responses (fake transports, custom factories)
#[derive(Debug)]
pub struct ResponseBuilder {
    parts: ResponseParts,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            parts: ResponseParts {
                status_code: 200,
                headers: HashMap::new(),
                body: Bytes::new(),
                url: String::new(),
                version: "HTTP/1.1".to_string(),
                latency_ms: 0,
            },
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.parts.status_code = code;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts
            .headers
            .insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.parts.body = body.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.parts.url = url.into();
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.parts.latency_ms = ms;
        self
    }

    pub fn into_parts(self) -> ResponseParts {
        self.parts
    }

    pub fn build(self) -> Response {
        Response::from_parts(self.parts)
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
