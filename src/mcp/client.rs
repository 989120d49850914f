//! HTTP client for one remote tool server

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};

use super::types::{
    JsonRpcRequest, JsonRpcResponse, McpTransport, RemoteTool, ToolServerConfig, parse_tools,
};
use crate::pool::{ConnectionPool, PooledResponse};
use crate::{Error, Result};

const HEALTH_PATH: &str = "/health";
const RPC_PATH: &str = "/mcp/v1";
const REST_LIST_PATH: &str = "/mcp/tools/list";
const REST_CALL_PATH: &str = "/mcp/tools/call";

/// Outcome of the most recent health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthRecord {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

/// Client for a single tool server, speaking its configured dialect
///
/// Discovery is tolerant (failures become "unhealthy" or "no tools");
/// invocation is strict (failures are returned to the caller).
#[derive(Debug)]
pub struct McpClient {
    config: ToolServerConfig,
    base_url: String,
    pool: Arc<ConnectionPool>,
    next_id: AtomicU64,
    last_health: Mutex<Option<HealthRecord>>,
    tool_count: AtomicUsize,
}

impl McpClient {
    /// Create a client for `config`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the server config is invalid
    pub fn new(config: ToolServerConfig, pool: Arc<ConnectionPool>) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        Ok(Self {
            config,
            base_url,
            pool,
            next_id: AtomicU64::new(1),
            last_health: Mutex::new(None),
            tool_count: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    #[must_use]
    pub const fn transport(&self) -> McpTransport {
        self.config.transport
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last recorded health check, if any
    #[must_use]
    pub fn last_health(&self) -> Option<HealthRecord> {
        *self.last_health.lock()
    }

    /// Number of tools seen by the last successful listing
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tool_count.load(Ordering::Relaxed)
    }

    /// Probe `GET /health`; any 2xx is healthy, anything else (including
    /// network failure) is not
    pub async fn health_check(&self) -> bool {
        let healthy = match self.pool.execute(self.request(Method::GET, HEALTH_PATH)).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::debug!(alias = %self.alias(), error = %e, "health check failed");
                false
            }
        };
        *self.last_health.lock() = Some(HealthRecord {
            healthy,
            checked_at: Utc::now(),
        });
        healthy
    }

    /// List the server's tools, or an empty list if discovery fails
    pub async fn list_tools(&self) -> Vec<RemoteTool> {
        match self.try_list_tools().await {
            Ok(tools) => {
                self.tool_count.store(tools.len(), Ordering::Relaxed);
                tools
            }
            Err(e) => {
                tracing::warn!(alias = %self.alias(), error = %e, "tool discovery failed");
                Vec::new()
            }
        }
    }

    /// List the server's tools, surfacing failures
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-2xx status, or a JSON-RPC error
    pub async fn try_list_tools(&self) -> Result<Vec<RemoteTool>> {
        let body = match self.config.transport {
            McpTransport::JsonRpc => self.rpc("tools/list", json!({})).await?,
            McpTransport::BridgeRest => self.rest(REST_LIST_PATH, None).await?,
        };
        Ok(parse_tools(body.get("tools")))
    }

    /// Invoke a tool
    ///
    /// Returns the JSON-RPC `result`, or the raw body in REST mode.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-2xx status, or a JSON-RPC error
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        tracing::debug!(alias = %self.alias(), tool = %name, "calling remote tool");
        match self.config.transport {
            McpTransport::JsonRpc => {
                self.rpc("tools/call", json!({ "name": name, "arguments": arguments }))
                    .await
            }
            McpTransport::BridgeRest => {
                self.rest(
                    REST_CALL_PATH,
                    Some(json!({ "tool_name": name, "arguments": arguments })),
                )
                .await
            }
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = JsonRpcRequest::new(id, method, params);
        let response = self
            .pool
            .execute(self.request(Method::POST, RPC_PATH).json(&envelope))
            .await?;
        self.ensure_success(&response, method)?;

        let parsed: JsonRpcResponse = response.json()?;
        if let Some(error) = parsed.error {
            return Err(Error::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn rest(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.request(Method::POST, path);
        if let Some(body) = &body {
            request = request.json(body);
        }
        let response = self.pool.execute(request).await?;
        self.ensure_success(&response, path)?;

        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }

    fn ensure_success(&self, response: &PooledResponse, what: &str) -> Result<()> {
        if response.is_success() {
            return Ok(());
        }
        Err(Error::Tool(format!(
            "{} {what} returned {}: {}",
            self.alias(),
            response.status,
            response.text()
        )))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .pool
            .client()
            .request(method, format!("{}{path}", self.base_url));
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;

    fn pool() -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(PoolConfig::default()).unwrap())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ToolServerConfig::new("bad", "not a url");
        assert!(matches!(McpClient::new(config, pool()), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_unhealthy_and_toolless() {
        // Port 9 (discard) is closed on test machines
        let client = McpClient::new(ToolServerConfig::local("down", 9), pool()).unwrap();
        assert!(client.last_health().is_none());

        assert!(!client.health_check().await);
        assert_eq!(client.last_health().map(|h| h.healthy), Some(false));
        assert!(client.list_tools().await.is_empty());
        assert!(client.call_tool("anything", Value::Null).await.is_err());
    }
}
