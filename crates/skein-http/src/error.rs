//! Resource error types and classification

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed cause carried by transport failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors surfaced by resource requests
///
/// The first five variants are the classification outcomes of a request;
/// the rest report misuse of the client itself.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The server answered 404
    #[error("Resource not found: {body}")]
    NotFound { body: String },

    /// The server answered 401/403 and no filter could resolve the challenge
    #[error("Unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// Any other 4xx/5xx answer
    #[error("Request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// Transport-level failure (DNS, connect, timeout, malformed response)
    #[error("Request error: {message}")]
    RequestError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Malformed URI or unparseable response content
    #[error("Parser error: {0}")]
    ParserError(String),

    /// The response body was already taken
    #[error("Response body already consumed")]
    BodyConsumed,

    /// Header name or value rejected by the HTTP grammar
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, ResourceError>;

/// Error category for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection-related errors (DNS, TCP, TLS)
    Connection,
    /// Timeout errors
    Timeout,
    /// Non-success HTTP answer
    Status,
    /// Malformed input or response content
    Parse,
    /// Misuse of the client API
    Usage,
    /// Unknown/other errors
    Unknown,
}

impl ResourceError {
    /// Build a transport failure from a plain message.
    pub fn request_error(message: impl Into<String>) -> Self {
        ResourceError::RequestError {
            message: message.into(),
            source: None,
        }
    }

    /// Build a transport failure that keeps its underlying cause.
    pub fn request_error_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ResourceError::RequestError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status attached to the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ResourceError::NotFound { .. } => Some(404),
            ResourceError::Unauthorized { status, .. }
            | ResourceError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body attached to the error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            ResourceError::NotFound { body }
            | ResourceError::Unauthorized { body, .. }
            | ResourceError::RequestFailed { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Categorize the error for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            ResourceError::NotFound { .. }
            | ResourceError::Unauthorized { .. }
            | ResourceError::RequestFailed { .. } => ErrorCategory::Status,
            ResourceError::RequestError { source, .. } => {
                match source.as_ref().and_then(|e| e.downcast_ref::<reqwest::Error>()) {
                    Some(e) if e.is_timeout() => ErrorCategory::Timeout,
                    Some(e) if e.is_connect() => ErrorCategory::Connection,
                    Some(_) => ErrorCategory::Unknown,
                    None => ErrorCategory::Connection,
                }
            }
            ResourceError::ParserError(_) => ErrorCategory::Parse,
            ResourceError::BodyConsumed
            | ResourceError::InvalidHeader(_)
            | ResourceError::Config(_) => ErrorCategory::Usage,
        }
    }

    /// Sanitize error message (remove credentials and tokens)
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

impl From<url::ParseError> for ResourceError {
    fn from(err: url::ParseError) -> Self {
        ResourceError::ParserError(err.to_string())
    }
}

impl From<reqwest::Error> for ResourceError {
    fn from(err: reqwest::Error) -> Self {
        let message = redact_uri(&err.to_string());
        ResourceError::request_error_with(message, err)
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(err: serde_json::Error) -> Self {
        ResourceError::ParserError(err.to_string())
    }
}

/// Replace `user:password@` userinfo inside any URI found in `text`.
pub fn redact_uri(text: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static USERINFO_RE: OnceLock<Regex> = OnceLock::new();

    let re = USERINFO_RE
        .get_or_init(|| Regex::new(r"([a-zA-Z][a-zA-Z0-9+.-]*://)[^/?#@\s]+@").expect("valid regex"));
    re.replace_all(text, "${1}[REDACTED]@").into_owned()
}

/// Sanitize error messages by removing sensitive information
fn sanitize_error_message(msg: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static AUTH_HEADER_RE: OnceLock<Regex> = OnceLock::new();

    let auth_header_re = AUTH_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)(authorization:\s*(?:basic|bearer)|bearer|basic|api[_-]?key|token)\s*[:=]?\s*\S+")
            .expect("valid regex")
    });

    let sanitized = redact_uri(msg);
    auth_header_re
        .replace_all(&sanitized, "$1: [REDACTED]")
        .into_owned()
}
