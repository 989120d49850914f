//! Shared outbound HTTP connection pool
//!
//! Every HTTP-speaking component (tool-server clients, the credential manager,
//! event history) goes through one [`ConnectionPool`]. It wraps a keep-alive
//! `reqwest` client serving both plain and TLS destinations, and bounds:
//! - concurrent sockets per destination host
//! - concurrent sockets across all destinations
//! - idle sockets retained for reuse
//!
//! Initialize once at startup with [`ConnectionPool::init_shared`]; the pool is
//! never recreated for the life of the process.

mod metrics;

pub use metrics::{ConnectionHealth, ConnectionMetrics, MetricsSnapshot};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{Error, Result};

/// TCP keep-alive interval for pooled sockets
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// How long an idle socket is retained before being closed
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Process-wide pool instance
static SHARED: OnceLock<Arc<ConnectionPool>> = OnceLock::new();

/// Connection pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Reuse connections across requests
    pub keep_alive: bool,
    /// Concurrent sockets allowed to a single destination host
    pub max_sockets_per_host: usize,
    /// Concurrent sockets allowed across all destinations
    pub max_total_sockets: usize,
    /// Idle sockets kept per host for reuse
    pub max_idle_sockets: usize,
    /// Fixed timeout applied to every request
    pub request_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_sockets_per_host: 10,
            max_total_sockets: 50,
            max_idle_sockets: 5,
            request_timeout_secs: 30,
        }
    }
}

impl PoolConfig {
    /// Reject limits that would make the pool unusable
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any socket cap or the timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_sockets_per_host == 0 || self.max_total_sockets == 0 {
            return Err(Error::Config(
                "pool socket limits must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "pool request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Response whose body has been fully read while the socket permits were held
#[derive(Debug, Clone)]
pub struct PooledResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl PooledResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, replacing invalid UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Bounded keep-alive HTTP pool shared by the whole node
#[derive(Debug)]
pub struct ConnectionPool {
    client: reqwest::Client,
    config: PoolConfig,
    total: Arc<Semaphore>,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    metrics: ConnectionMetrics,
    health: Mutex<ConnectionHealth>,
}

impl ConnectionPool {
    /// Build an isolated pool
    ///
    /// Production code should use [`Self::init_shared`]; this constructor
    /// exists so tests can run against their own limits.
    ///
    /// # Errors
    ///
    /// Returns error if the limits are invalid or the HTTP client cannot be built
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let idle = if config.keep_alive {
            config.max_idle_sockets
        } else {
            0
        };

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(idle)
            .timeout(config.request_timeout())
            .user_agent(concat!("agent-node/", env!("CARGO_PKG_VERSION")));

        if config.keep_alive {
            builder = builder
                .tcp_keepalive(TCP_KEEPALIVE)
                .pool_idle_timeout(IDLE_TIMEOUT);
        }

        let client = builder.build()?;

        tracing::debug!(
            keep_alive = config.keep_alive,
            per_host = config.max_sockets_per_host,
            total = config.max_total_sockets,
            idle = idle,
            "connection pool created"
        );

        Ok(Self {
            client,
            total: Arc::new(Semaphore::new(config.max_total_sockets)),
            per_host: Mutex::new(HashMap::new()),
            config,
            metrics: ConnectionMetrics::default(),
            health: Mutex::new(ConnectionHealth::default()),
        })
    }

    /// Initialize the process-wide pool, or return it if it already exists
    ///
    /// The first successful call wins; later configs are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the pool does not exist yet and cannot be built
    pub fn init_shared(config: PoolConfig) -> Result<Arc<Self>> {
        if let Some(pool) = SHARED.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(Self::new(config)?);
        Ok(Arc::clone(SHARED.get_or_init(|| pool)))
    }

    /// The process-wide pool, if initialized
    #[must_use]
    pub fn shared() -> Option<Arc<Self>> {
        SHARED.get().cloned()
    }

    /// Underlying client, for building requests passed to [`Self::execute`]
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub const fn metrics(&self) -> &ConnectionMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.health.lock().clone()
    }

    /// Sockets that can still be opened before the global cap is reached
    #[must_use]
    pub fn available_sockets(&self) -> usize {
        self.total.available_permits()
    }

    /// Send a request under the pool's socket limits
    ///
    /// One global and one per-host permit are held until the response body has
    /// been read in full. Non-2xx statuses are returned, not treated as errors.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built, sent, or its body read
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> Result<PooledResponse> {
        let request = request.build()?;
        let host = host_key(request.url());

        // Host permit first: a request queued behind a busy host must not hold a global socket
        let _host = self
            .host_semaphore(&host)
            .acquire_owned()
            .await
            .map_err(|_| Error::Transport("connection pool closed".to_string()))?;
        let _total = Arc::clone(&self.total)
            .acquire_owned()
            .await
            .map_err(|_| Error::Transport("connection pool closed".to_string()))?;

        let result = async {
            let response = self.client.execute(request).await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(PooledResponse {
                status,
                body: body.to_vec(),
            })
        }
        .await;

        match &result {
            Ok(_) => {
                self.metrics.record_request(true, false);
                self.health.lock().mark_healthy();
            }
            Err(e) => {
                self.metrics.record_request(false, e.is_timeout());
                self.health.lock().mark_unhealthy(e.to_string());
                tracing::debug!(host = %host, error = %e, "pooled request failed");
            }
        }

        result.map_err(Error::from)
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut per_host = self.per_host.lock();
        Arc::clone(
            per_host
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_sockets_per_host))),
        )
    }
}

/// Destination key used for per-host limits: `scheme://host:port`
fn host_key(url: &url::Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_fills_default_ports() {
        let plain = url::Url::parse("http://tools.local/mcp/v1").unwrap();
        let tls = url::Url::parse("https://tools.local/health").unwrap();
        let custom = url::Url::parse("http://localhost:8931/").unwrap();

        assert_eq!(host_key(&plain), "http://tools.local:80");
        assert_eq!(host_key(&tls), "https://tools.local:443");
        assert_eq!(host_key(&custom), "http://localhost:8931");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = PoolConfig {
            max_total_sockets: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = PoolConfig {
            request_timeout_secs: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn per_host_semaphores_are_reused() {
        let pool = ConnectionPool::new(PoolConfig::default()).unwrap();
        let a = pool.host_semaphore("http://a:80");
        let again = pool.host_semaphore("http://a:80");
        let b = pool.host_semaphore("http://b:80");

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.available_permits(), PoolConfig::default().max_sockets_per_host);
    }

    #[test]
    fn shared_pool_is_created_once() {
        let first = ConnectionPool::init_shared(PoolConfig::default()).unwrap();
        let second = ConnectionPool::init_shared(PoolConfig {
            max_total_sockets: 1,
            ..PoolConfig::default()
        })
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &ConnectionPool::shared().unwrap()));
    }
}
