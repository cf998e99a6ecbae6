//! Shared HTTP types for the skein client.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    /// Returns the method as it appears on the request line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(format!("Invalid HTTP method: {}", s)),
        }
    }
}

/// HTTP status code wrapper with classification helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub const OK: Self = Self(200);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);

    /// Returns the status code as u16.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Returns true if this is a success status (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Returns true if this is a redirect status (3xx).
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.0)
    }

    /// Returns true if this is a client error status (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// Returns true if this is a server error status (5xx).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }

    /// Returns true for any status the client treats as a failure (>= 400).
    pub fn is_error(&self) -> bool {
        self.0 >= 400
    }

    /// Returns true for 401 and 403, the statuses an auth filter may answer.
    pub fn is_auth_challenge(&self) -> bool {
        *self == Self::UNAUTHORIZED || *self == Self::FORBIDDEN
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for HttpStatus {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<HttpStatus> for u16 {
    fn from(status: HttpStatus) -> Self {
        status.0
    }
}

/// Read-only view over an HTTP response's status line and headers.
///
/// Header maps are expected to hold lower-cased names.
pub trait HttpResponseLike {
    /// Returns the HTTP status code.
    fn status_code(&self) -> u16;

    /// Returns the response headers.
    fn headers(&self) -> &HashMap<String, String>;

    /// Returns the HTTP status.
    fn status(&self) -> HttpStatus {
        HttpStatus(self.status_code())
    }

    /// Returns true if this is a success response (2xx).
    fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Returns true if this is a client error response (4xx).
    fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error response (5xx).
    fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Gets a header value by name (case-insensitive).
    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .get(&name.to_lowercase())
            .map(|s| s.as_str())
    }

    /// Returns the Content-Type header value.
    fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the Content-Length header value.
    fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|s| s.parse().ok())
    }
}
