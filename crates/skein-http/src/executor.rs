//! Single-attempt request dispatch

use std::fmt;
use std::sync::Arc;

use skein_common::http::HttpResponseLike;
use tracing::{debug, warn};

use crate::error::{redact_uri, ResourceError, Result};
use crate::filter::FilterChain;
use crate::pool::{ConnectionPool, HostPort};
use crate::request::RequestSpec;
use crate::response::{DefaultResponseFactory, Response, ResponseFactory};

/// Sends one request through a pooled transport and wraps whatever comes
/// back. Status codes are not interpreted here and nothing is retried.
#[derive(Clone)]
pub struct RequestExecutor {
    pool: Arc<dyn ConnectionPool>,
    factory: Arc<dyn ResponseFactory>,
}

impl RequestExecutor {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            pool,
            factory: Arc::new(DefaultResponseFactory),
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ResponseFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// Run the filters over `request`, then send it and build the response.
    /// The pool key is taken from the URI after filtering.
    ///
    /// A transport that fails, or that finishes without producing a
    /// response, is dropped instead of being handed back to the pool.
    pub async fn execute(&self, mut request: RequestSpec, filters: &FilterChain) -> Result<Response> {
        filters.apply_request(&mut request)?;
        let host = HostPort::from_uri(&request.uri)?;

        let transport = self.pool.acquire(&host).await?;
        debug!(
            method = %request.method,
            uri = %redact_uri(&request.uri),
            "dispatching request"
        );

        match transport.send(&request).await {
            Ok(Some(parts)) => {
                self.pool.release(&host, transport).await;
                let response = self.factory.build(parts);
                debug!(
                    status = response.status_code(),
                    latency_ms = response.latency().as_millis() as u64,
                    "response received"
                );
                Ok(response)
            }
            Ok(None) => {
                warn!(%host, "connection closed without a response");
                Err(ResourceError::request_error(format!(
                    "no response from {}",
                    host
                )))
            }
            Err(e) => {
                warn!(%host, error = %e.sanitized_message(), "request failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("pool", &self.pool)
            .field("factory", &self.factory)
            .finish()
    }
}
