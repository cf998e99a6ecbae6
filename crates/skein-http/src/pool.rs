//! Connection pool collaborator
//!
//! The core only needs three things from a pool: hand out a transport for a
//! host, take it back after a successful exchange, and forget everything it
//! holds for a host. [`SimplePool`] is the stock implementation; any other
//! pool can be injected through `ResourceConfig::pool`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::{ResourceError, Result};
use crate::request::RequestSpec;
use crate::response::ResponseParts;
use crate::transport::ReqwestTransport;

/// Pool key: scheme, host and effective port of a URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    scheme: String,
    host: String,
    port: u16,
}

impl HostPort {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into().to_lowercase(),
            port,
        }
    }

    /// Derive the key from an absolute URI, filling in the scheme's default port.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| ResourceError::ParserError(format!("invalid URI: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ResourceError::ParserError(format!("URI has no host: {}", url)))?;
        let port = url.port_or_known_default().ok_or_else(|| {
            ResourceError::ParserError(format!("no default port for scheme '{}'", url.scheme()))
        })?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One reusable connection to a host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. `Ok(None)` means the connection produced no
    /// response at all (e.g. it was closed under us).
    async fn send(&self, request: &RequestSpec) -> Result<Option<ResponseParts>>;
}

/// Shared source of transports, keyed by [`HostPort`].
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Get a transport for `host`, reusing an idle one or opening a new one.
    async fn acquire(&self, host: &HostPort) -> Result<Arc<dyn Transport>>;

    /// Hand a healthy transport back after a completed exchange.
    async fn release(&self, host: &HostPort, transport: Arc<dyn Transport>);

    /// Drop every pooled transport for `host`.
    async fn clear(&self, host: &HostPort);
}

impl fmt::Debug for dyn ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionPool")
    }
}

/// Settings handed to pools and the transports they open.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    /// Maximum idle transports kept per host
    pub keepalive: usize,
    /// Transport-level timeout
    pub timeout: Duration,
    /// Transport-specific options passed through untouched
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            keepalive: 10,
            timeout: Duration::from_secs(300),
            extensions: BTreeMap::new(),
        }
    }
}

impl PoolSettings {
    /// Names of the settings in `other` that a pool built with `self` would
    /// not honor. The timeout is left out: every request carries its own.
    pub fn transport_differences(&self, other: &PoolSettings) -> Vec<String> {
        let mut differences = Vec::new();
        if self.keepalive != other.keepalive {
            differences.push("keepalive".to_string());
        }
        let keys: BTreeSet<&String> = self
            .extensions
            .keys()
            .chain(other.extensions.keys())
            .collect();
        for key in keys {
            if self.extensions.get(key) != other.extensions.get(key) {
                differences.push(key.clone());
            }
        }
        differences
    }
}

/// Opens a new transport for a host.
pub type Connector = dyn Fn(&HostPort, &PoolSettings) -> Result<Arc<dyn Transport>> + Send + Sync;

/// Per-host idle lists of transports.
///
/// The lock is only held while the idle lists are touched, never while a
/// transport is being opened or used.
pub struct SimplePool {
    settings: PoolSettings,
    connector: Arc<Connector>,
    idle: Mutex<HashMap<HostPort, Vec<Arc<dyn Transport>>>>,
}

impl SimplePool {
    /// Pool opening [`ReqwestTransport`]s.
    pub fn new(settings: PoolSettings) -> Self {
        Self::with_connector(settings, |host, settings| {
            Ok(Arc::new(ReqwestTransport::connect(host, settings)?) as Arc<dyn Transport>)
        })
    }

    /// Pool opening transports with a custom connector.
    pub fn with_connector<F>(settings: PoolSettings, connector: F) -> Self
    where
        F: Fn(&HostPort, &PoolSettings) -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        Self {
            settings,
            connector: Arc::new(connector),
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of idle transports currently held for `host`.
    pub fn idle_count(&self, host: &HostPort) -> usize {
        self.idle.lock().get(host).map_or(0, Vec::len)
    }

    /// Drop every idle transport for every host.
    pub fn clear_all(&self) {
        let dropped: usize = self.idle.lock().drain().map(|(_, list)| list.len()).sum();
        debug!(dropped, "cleared all pooled transports");
    }
}

#[async_trait]
impl ConnectionPool for SimplePool {
    async fn acquire(&self, host: &HostPort) -> Result<Arc<dyn Transport>> {
        let reused = self.idle.lock().get_mut(host).and_then(Vec::pop);
        match reused {
            Some(transport) => {
                debug!(%host, "reusing pooled transport");
                Ok(transport)
            }
            None => {
                debug!(%host, "opening new transport");
                (self.connector)(host, &self.settings)
            }
        }
    }

    async fn release(&self, host: &HostPort, transport: Arc<dyn Transport>) {
        let mut idle = self.idle.lock();
        let list = idle.entry(host.clone()).or_default();
        if list.len() < self.settings.keepalive {
            list.push(transport);
        }
    }

    async fn clear(&self, host: &HostPort) {
        if let Some(list) = self.idle.lock().remove(host) {
            debug!(%host, dropped = list.len(), "cleared pooled transports");
        }
    }
}

impl fmt::Debug for SimplePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts = self.idle.lock().len();
        f.debug_struct("SimplePool")
            .field("settings", &self.settings)
            .field("hosts", &hosts)
            .finish()
    }
}

static DEFAULT_POOL: Lazy<Mutex<Option<Arc<SimplePool>>>> = Lazy::new(|| Mutex::new(None));

/// Process-wide pool shared by resources that were not given one.
///
/// Created on first use with the caller's settings; later callers get the
/// same instance regardless of the settings they pass.
pub fn default_pool(settings: &PoolSettings) -> Arc<SimplePool> {
    let mut slot = DEFAULT_POOL.lock();
    slot.get_or_insert_with(|| {
        info!(
            keepalive = settings.keepalive,
            timeout_secs = settings.timeout.as_secs_f64(),
            "creating default connection pool"
        );
        Arc::new(SimplePool::new(settings.clone()))
    })
    .clone()
}

/// Tear down the process-wide pool. The next [`default_pool`] call builds a
/// fresh one.
pub fn shutdown_default_pool() {
    let pool = DEFAULT_POOL.lock().take();
    if let Some(pool) = pool {
        pool.clear_all();
        info!("default connection pool shut down");
    }
}
