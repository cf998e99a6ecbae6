//! reqwest-backed transport

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ResourceError, Result};
use crate::pool::{HostPort, PoolSettings, Transport};
use crate::request::{HttpMethod, RequestSpec};
use crate::response::ResponseParts;

/// Convert HttpMethod to reqwest Method
fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

/// Transport for one host on top of a `reqwest::Client`.
///
/// Recognized extensions: `user_agent` (string), `connect_timeout`
/// (seconds), `follow_redirects` (bool), `gzip` (bool). Other keys are
/// ignored.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    host: HostPort,
}

impl ReqwestTransport {
    pub fn connect(host: &HostPort, settings: &PoolSettings) -> Result<Self> {
        let ext = &settings.extensions;

        let user_agent = ext
            .get("user_agent")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("skein-http/{}", env!("CARGO_PKG_VERSION")));

        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.keepalive)
            .user_agent(user_agent);

        if let Some(secs) = ext.get("connect_timeout").and_then(|v| v.as_f64()) {
            let timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                ResourceError::Config(format!("connect_timeout: {}", e))
            })?;
            builder = builder.connect_timeout(timeout);
        }

        // Redirects are surfaced to the caller unless explicitly enabled
        let follow = ext
            .get("follow_redirects")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        builder = builder.redirect(if follow {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

        if let Some(gzip) = ext.get("gzip").and_then(|v| v.as_bool()) {
            builder = builder.gzip(gzip);
        }

        let client = builder.build().map_err(|e| {
            ResourceError::request_error_with(format!("failed to build transport for {}", host), e)
        })?;

        Ok(Self {
            client,
            host: host.clone(),
        })
    }

    pub fn host(&self) -> &HostPort {
        &self.host
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> Result<Option<ResponseParts>> {
        let start = Instant::now();

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.uri)
            .headers(request.headers.as_header_map().clone());

        if !request.payload.is_empty() {
            builder = builder.body(request.payload.to_bytes()?);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(host = %self.host, error = %e, "transport failure");
            ResourceError::from(e)
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        from_reqwest(response, latency_ms).await.map(Some)
    }
}

/// Convert reqwest Response to ResponseParts
async fn from_reqwest(response: reqwest::Response, latency_ms: u64) -> Result<ResponseParts> {
    let status_code = response.status().as_u16();
    let url = response.url().to_string();
    let version = format!("{:?}", response.version());

    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in response.headers().iter() {
        if let Ok(v) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(v);
                })
                .or_insert_with(|| v.to_string());
        }
    }

    // Read body
    let body = response.bytes().await?;

    Ok(ResponseParts {
        status_code,
        headers,
        body,
        url,
        version,
        latency_ms,
    })
}
