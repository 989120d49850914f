//! Node runtime: wires the pool, registries, bridge, credentials and events together

use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::dispatch::{DispatchRegistry, Invocation, RouterGroup};
use crate::events::EventClient;
use crate::identity::{Credential, CredentialManager};
use crate::mcp::{BridgedCallable, McpBridge, McpRegistry};
use crate::pool::ConnectionPool;
use crate::Result;

/// What `start` achieved
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub bridged: Vec<BridgedCallable>,
    pub identity_enabled: bool,
    pub events_enabled: bool,
}

/// An agent node
///
/// Degradation is additive: directly registered callables keep working when
/// identity registration fails, tool servers are down, or the event stream is
/// reconnecting.
#[derive(Debug)]
pub struct Node {
    config: Config,
    pool: Arc<ConnectionPool>,
    dispatch: Arc<DispatchRegistry>,
    servers: Arc<McpRegistry>,
    bridge: Arc<McpBridge>,
    credentials: CredentialManager,
    events: Option<EventClient>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Build a node on the process-wide connection pool
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any part of the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        let pool = ConnectionPool::init_shared(config.pool.clone())?;
        Self::with_pool(config, pool)
    }

    /// Build a node on a caller-supplied pool
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any part of the configuration is invalid
    pub fn with_pool(config: Config, pool: Arc<ConnectionPool>) -> Result<Self> {
        config.validate()?;

        let servers = McpRegistry::from_configs(&config.mcp.servers, &pool)?;

        let mut bridge = McpBridge::new()
            .with_tags(config.mcp.tags.iter().cloned())
            .verbose(config.verbose);
        if let Some(namespace) = &config.mcp.namespace {
            bridge = bridge.with_namespace(namespace.clone());
        }

        let credentials = CredentialManager::new(
            config.control_plane_url.clone(),
            config.node_id.clone(),
            Arc::clone(&pool),
        )
        .with_token(config.token.clone());

        let events = if config.events.enabled {
            let mut events_config = config.events.clone();
            if let Some(token) = &config.token {
                events_config
                    .headers
                    .entry("authorization".to_string())
                    .or_insert_with(|| format!("Bearer {}", token.expose_secret()));
            }
            Some(EventClient::websocket(&config.control_plane_url, &events_config)?)
        } else {
            None
        };

        Ok(Self {
            config,
            pool,
            dispatch: Arc::new(DispatchRegistry::new()),
            servers: Arc::new(servers),
            bridge: Arc::new(bridge),
            credentials,
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    #[must_use]
    pub fn dispatch(&self) -> &DispatchRegistry {
        &self.dispatch
    }

    #[must_use]
    pub fn servers(&self) -> &McpRegistry {
        &self.servers
    }

    #[must_use]
    pub const fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Event client, when events are enabled
    #[must_use]
    pub const fn events(&self) -> Option<&EventClient> {
        self.events.as_ref()
    }

    /// Merge a router into the dispatch registry
    pub fn include_router(&self, router: RouterGroup) -> usize {
        self.dispatch.include_router(router)
    }

    /// Run one bridging pass
    pub async fn bridge_tools(&self) -> Vec<BridgedCallable> {
        self.bridge.bridge(&self.servers, &self.dispatch).await
    }

    /// Bridge tools, register identity, subscribe to events and schedule re-bridging
    ///
    /// Never fails: each step degrades on its own.
    pub async fn start(&self) -> StartReport {
        let bridged = self.bridge_tools().await;

        let identity_enabled = self
            .credentials
            .register_node(&self.dispatch.bot_names(), &self.dispatch.skill_names())
            .await;

        if let Some(events) = &self.events {
            events.start();
        }

        if let Some(interval) = self.config.mcp.bridge_interval {
            let bridge = Arc::clone(&self.bridge);
            let servers = Arc::clone(&self.servers);
            let dispatch = Arc::clone(&self.dispatch);
            self.tasks.lock().push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let made = bridge.bridge(&servers, &dispatch).await;
                    tracing::debug!(count = made.len(), "periodic bridging pass");
                }
            }));
        }

        tracing::info!(
            node_id = %self.config.node_id,
            callables = self.dispatch.len(),
            bridged = bridged.len(),
            identity = identity_enabled,
            "agent node started"
        );

        StartReport {
            bridged,
            identity_enabled,
            events_enabled: self.events.is_some(),
        }
    }

    /// Invoke a callable by name, issuing a credential when identity is enabled
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for unknown names, otherwise the callable's own error
    pub async fn invoke(&self, name: &str, invocation: Invocation) -> Result<Value> {
        self.invoke_audited(name, invocation).await.0
    }

    /// Invoke a callable and return the credential alongside the result
    ///
    /// The caller identity is the node itself.
    pub async fn invoke_audited(
        &self,
        name: &str,
        invocation: Invocation,
    ) -> (Result<Value>, Option<Credential>) {
        let context =
            self.credentials
                .create_execution_context(&invocation, &self.config.node_id, name);
        let input = invocation.input.clone();
        self.credentials
            .audit(context.as_ref(), &input, self.dispatch.invoke(name, invocation))
            .await
    }

    /// Stop the event stream and background tasks
    pub fn shutdown(&self) {
        if let Some(events) = &self.events {
            events.stop();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::info!(node_id = %self.config.node_id, "agent node stopped");
    }
}
