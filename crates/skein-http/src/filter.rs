//! Request filters
//!
//! A filter can rewrite outgoing requests and react to 401/403 answers. The
//! chain is owned by a resource and borrowed by every request it issues, so
//! a filter that keeps state (a refreshed token, a nonce counter) must guard
//! it itself.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use futures::future::join_all;
use http::header::AUTHORIZATION;
use tracing::debug;

use crate::error::Result;
use crate::request::RequestSpec;
use crate::response::Response;

/// Pluggable request/challenge hook.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Rewrite the outgoing request before it is sent.
    fn on_request(&self, _request: &mut RequestSpec) -> Result<()> {
        Ok(())
    }

    /// React to a 401/403. Return true if state changed so that sending the
    /// same request again may succeed.
    async fn on_unauthorized(&self, _response: &Response) -> bool {
        false
    }
}

/// Ordered filters applied to every request of a resource.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every `on_request` in chain order.
    pub fn apply_request(&self, request: &mut RequestSpec) -> Result<()> {
        for filter in &self.filters {
            filter.on_request(request)?;
        }
        Ok(())
    }

    /// Ask every filter about a challenge; true if at least one can resolve it.
    ///
    /// All filters are asked, even after one says yes.
    pub async fn on_unauthorized(&self, response: &Response) -> bool {
        let answers = join_all(self.filters.iter().map(|f| f.on_unauthorized(response))).await;
        for (filter, handled) in self.filters.iter().zip(&answers) {
            debug!(filter = filter.name(), handled, "challenge answered");
        }
        answers.into_iter().any(|handled| handled)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filters.iter()).finish()
    }
}

impl FromIterator<Arc<dyn Filter>> for FilterChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Filter>>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

/// HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `Authorization` header value.
    pub fn header_value(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl Filter for BasicAuth {
    fn name(&self) -> &str {
        "basic-auth"
    }

    /// An explicit `Authorization` header on the call wins.
    fn on_request(&self, request: &mut RequestSpec) -> Result<()> {
        if !request.headers.contains(AUTHORIZATION.as_str()) {
            request
                .headers
                .insert(AUTHORIZATION.as_str(), &self.header_value())?;
        }
        Ok(())
    }
}
