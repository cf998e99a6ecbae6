//! skein-http: resource-oriented async HTTP client
//!
//! A [`Resource`] wraps a base URI. Calls on it compose a request URI,
//! dispatch through a shared keep-alive pool and turn the answer into either
//! a [`Response`] or a typed [`ResourceError`].
//!
//! # Architecture
//!
//! - `uri`: URI composition and encoding
//! - `credentials`: userinfo extraction into a basic auth filter
//! - `pool` / `transport`: pool contract, `SimplePool` and the reqwest transport
//! - `filter`: request filters and challenge handling
//! - `executor`: one attempt through a pooled transport
//! - `classify`: status classification and the auth retry decision
//! - `resource`: the `Resource` handle tying it together

pub mod classify;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod filter;
pub mod pool;
pub mod request;
pub mod resource;
pub mod response;
pub mod transport;
pub mod uri;

pub use classify::{ChallengePolicy, Outcome, ResponseClassifier};
pub use config::ResourceConfig;
pub use credentials::extract_credentials;
pub use error::{redact_uri, ErrorCategory, ResourceError, Result};
pub use executor::RequestExecutor;
pub use filter::{BasicAuth, Filter, FilterChain};
pub use pool::{
    default_pool, shutdown_default_pool, ConnectionPool, HostPort, PoolSettings, SimplePool,
    Transport,
};
pub use request::{Call, Headers, HttpMethod, Payload, RequestSpec};
pub use resource::{RequestShaper, Resource, ResourceIdentity};
pub use response::{DefaultResponseFactory, Response, ResponseBuilder, ResponseFactory, ResponseParts};
pub use transport::ReqwestTransport;
pub use uri::{make_uri, Params, UriBuilder, UriEncoding};

// Re-export shared HTTP types from skein-common
pub use skein_common::http::{HttpResponseLike, HttpStatus};
