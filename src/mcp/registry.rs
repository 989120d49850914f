//! Registry of tool-server clients and aggregate health

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;

use super::client::{HealthRecord, McpClient};
use super::types::{McpTransport, ToolServerConfig};
use crate::pool::ConnectionPool;
use crate::{Error, Result};

/// Aggregate health across every configured tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every server passed
    Ok,
    /// At least one server failed
    Degraded,
    /// No servers configured
    Disabled,
}

/// Result of a health sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub total: usize,
    pub healthy: usize,
    /// Per-alias result, in registration order
    pub servers: IndexMap<String, bool>,
}

/// Introspection row for one server
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub alias: String,
    pub transport: McpTransport,
    pub base_url: String,
    pub last_health: Option<HealthRecord>,
    pub tool_count: usize,
}

/// Tool-server clients keyed by alias
#[derive(Debug, Default)]
pub struct McpRegistry {
    clients: RwLock<IndexMap<String, Arc<McpClient>>>,
}

impl McpRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one client per config
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on an invalid config or a duplicate alias
    pub fn from_configs(configs: &[ToolServerConfig], pool: &Arc<ConnectionPool>) -> Result<Self> {
        let registry = Self::new();
        for config in configs {
            registry.register(config.clone(), Arc::clone(pool))?;
        }
        Ok(registry)
    }

    /// Create and store a client for `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on an invalid config or a duplicate alias
    pub fn register(
        &self,
        config: ToolServerConfig,
        pool: Arc<ConnectionPool>,
    ) -> Result<Arc<McpClient>> {
        let mut clients = self.clients.write();
        if clients.contains_key(&config.alias) {
            return Err(Error::Config(format!(
                "duplicate tool server alias: {}",
                config.alias
            )));
        }
        let client = Arc::new(McpClient::new(config, pool)?);
        tracing::debug!(
            alias = %client.alias(),
            transport = %client.transport(),
            url = %client.base_url(),
            "tool server registered"
        );
        clients.insert(client.alias().to_string(), Arc::clone(&client));
        Ok(client)
    }

    #[must_use]
    pub fn get(&self, alias: &str) -> Option<Arc<McpClient>> {
        self.clients.read().get(alias).cloned()
    }

    /// Every client in registration order
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<McpClient>> {
        self.clients.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Health-check every server concurrently and aggregate the results
    pub async fn health_summary(&self) -> HealthSummary {
        let clients = self.clients();
        let checks = clients.iter().map(|client| async move {
            (client.alias().to_string(), client.health_check().await)
        });
        summarize(join_all(checks).await)
    }

    /// Last-known state of every server, without probing
    #[must_use]
    pub fn status_list(&self) -> Vec<ServerStatus> {
        self.clients
            .read()
            .values()
            .map(|client| ServerStatus {
                alias: client.alias().to_string(),
                transport: client.transport(),
                base_url: client.base_url().to_string(),
                last_health: client.last_health(),
                tool_count: client.tool_count(),
            })
            .collect()
    }
}

fn summarize(results: Vec<(String, bool)>) -> HealthSummary {
    let total = results.len();
    let healthy = results.iter().filter(|(_, ok)| *ok).count();
    let status = if total == 0 {
        HealthStatus::Disabled
    } else if healthy == total {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };
    HealthSummary {
        status,
        total,
        healthy,
        servers: results.into_iter().collect(),
    }
}
