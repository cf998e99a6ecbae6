//! Resource configuration

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ChallengePolicy;
use crate::error::{ResourceError, Result};
use crate::filter::{Filter, FilterChain};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::request::Headers;
use crate::resource::RequestShaper;
use crate::response::ResponseFactory;
use crate::uri::{UriEncoding, DEFAULT_SAFE};

/// Options for a [`Resource`](crate::Resource).
///
/// The plain fields can be loaded from JSON; the strategy objects can only
/// be set in code. Unknown keys are kept in `extensions` and passed to the
/// transport untouched.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Transport timeout, in seconds when serialized
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Maximum idle transports kept per host
    #[serde(default = "default_keepalive")]
    pub keepalive: usize,

    /// How many times one call may be resent after a 401/403
    #[serde(default = "default_max_auth_retries")]
    pub max_auth_retries: u32,

    /// Characters left unencoded in paths and query values
    #[serde(default = "default_safe")]
    pub safe: String,

    #[serde(default = "default_true")]
    pub encode_keys: bool,

    /// Turn `user:password@` in the base URI into a basic auth filter
    #[serde(default = "default_true")]
    pub basic_auth_url: bool,

    /// Headers sent with every request unless the call overrides them
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(skip)]
    pub filters: FilterChain,

    #[serde(skip)]
    pub response_factory: Option<Arc<dyn ResponseFactory>>,

    /// Shared pool; the process-wide default pool is used when unset
    #[serde(skip)]
    pub pool: Option<Arc<dyn ConnectionPool>>,

    #[serde(skip)]
    pub shaper: Option<Arc<dyn RequestShaper>>,

    #[serde(skip)]
    pub challenge_policy: Option<Arc<dyn ChallengePolicy>>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_keepalive() -> usize {
    10
}

fn default_max_auth_retries() -> u32 {
    1
}

fn default_safe() -> String {
    DEFAULT_SAFE.to_string()
}

fn default_true() -> bool {
    true
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            keepalive: default_keepalive(),
            max_auth_retries: default_max_auth_retries(),
            safe: default_safe(),
            encode_keys: true,
            basic_auth_url: true,
            headers: BTreeMap::new(),
            filters: FilterChain::new(),
            response_factory: None,
            pool: None,
            shaper: None,
            challenge_policy: None,
            extensions: BTreeMap::new(),
        }
    }
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON options object.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ResourceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no request could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(ResourceError::Config("timeout must be positive".into()));
        }
        if let Some(c) = self
            .safe
            .chars()
            .find(|c| !c.is_ascii_graphic() || c.is_ascii_alphanumeric() || *c == '%')
        {
            return Err(ResourceError::Config(format!(
                "invalid character {:?} in safe set",
                c
            )));
        }
        self.default_headers()?;
        Ok(())
    }

    /// `headers` as a validated header map.
    pub fn default_headers(&self) -> Result<Headers> {
        Headers::from_pairs(&self.headers)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            keepalive: self.keepalive,
            timeout: self.timeout,
            extensions: self.extensions.clone(),
        }
    }

    pub fn encoding(&self) -> UriEncoding {
        UriEncoding::new(&self.safe, self.encode_keys)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, keepalive: usize) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_max_auth_retries(mut self, retries: u32) -> Self {
        self.max_auth_retries = retries;
        self
    }

    pub fn with_safe(mut self, safe: impl Into<String>) -> Self {
        self.safe = safe.into();
        self
    }

    pub fn with_encode_keys(mut self, encode: bool) -> Self {
        self.encode_keys = encode;
        self
    }

    pub fn with_basic_auth_url(mut self, enabled: bool) -> Self {
        self.basic_auth_url = enabled;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters = self.filters.with(filter);
        self
    }

    pub fn with_response_factory(mut self, factory: Arc<dyn ResponseFactory>) -> Self {
        self.response_factory = Some(factory);
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_shaper(mut self, shaper: Arc<dyn RequestShaper>) -> Self {
        self.shaper = Some(shaper);
        self
    }

    pub fn with_challenge_policy(mut self, policy: Arc<dyn ChallengePolicy>) -> Self {
        self.challenge_policy = Some(policy);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("timeout", &self.timeout)
            .field("keepalive", &self.keepalive)
            .field("max_auth_retries", &self.max_auth_retries)
            .field("safe", &self.safe)
            .field("encode_keys", &self.encode_keys)
            .field("basic_auth_url", &self.basic_auth_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.names())
            .field("custom_pool", &self.pool.is_some())
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
