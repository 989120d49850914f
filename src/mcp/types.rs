//! Tool-server configuration and wire types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Wire dialect spoken by a tool server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum McpTransport {
    /// JSON-RPC 2.0 envelopes posted to `/mcp/v1`
    #[default]
    #[serde(rename = "jsonrpc")]
    JsonRpc,
    /// Plain REST: `/mcp/tools/list` and `/mcp/tools/call`
    #[serde(rename = "bridge-rest")]
    BridgeRest,
}

impl fmt::Display for McpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonRpc => f.write_str("jsonrpc"),
            Self::BridgeRest => f.write_str("bridge-rest"),
        }
    }
}

impl FromStr for McpTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jsonrpc" | "json-rpc" => Ok(Self::JsonRpc),
            "bridge-rest" | "bridge_rest" | "rest" => Ok(Self::BridgeRest),
            other => Err(Error::Config(format!("unknown tool server transport: {other}"))),
        }
    }
}

/// One configured remote tool server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Unique local name for the server
    pub alias: String,
    /// Base URL; takes precedence over `port`
    #[serde(default)]
    pub url: Option<String>,
    /// Port on localhost, used when no URL is given
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: McpTransport,
    /// Headers sent with every request to this server
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ToolServerConfig {
    #[must_use]
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: Some(url.into()),
            port: None,
            transport: McpTransport::default(),
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn local(alias: impl Into<String>, port: u16) -> Self {
        Self {
            alias: alias.into(),
            url: None,
            port: Some(port),
            transport: McpTransport::default(),
            headers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_transport(mut self, transport: McpTransport) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Base URL without a trailing slash
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if neither a usable URL nor a port is configured
    pub fn base_url(&self) -> Result<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            let parsed = url::Url::parse(url).map_err(|e| {
                Error::Config(format!("tool server '{}' has invalid url: {e}", self.alias))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "tool server '{}' url must be http or https",
                    self.alias
                )));
            }
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.port {
            Some(port) if port > 0 => Ok(format!("http://localhost:{port}")),
            _ => Err(Error::Config(format!(
                "tool server '{}' needs a url or a port",
                self.alias
            ))),
        }
    }

    /// Validate alias and address
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the alias is blank or no address is usable
    pub fn validate(&self) -> Result<()> {
        if self.alias.trim().is_empty() {
            return Err(Error::Config("tool server alias must not be empty".to_string()));
        }
        self.base_url().map(|_| ())
    }
}

/// A tool advertised by a remote server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool entry as it arrives on the wire; servers use either key casing
#[derive(Debug, Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    input_schema: Option<Value>,
}

impl From<WireTool> for RemoteTool {
    fn from(wire: WireTool) -> Self {
        Self {
            name: wire.name,
            description: wire.description.unwrap_or_default(),
            input_schema: wire
                .input_schema
                .filter(|s| !s.is_null())
                .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} })),
        }
    }
}

/// Normalize a `tools` array, skipping entries that are not tool objects
#[must_use]
pub fn parse_tools(tools: Option<&Value>) -> Vec<RemoteTool> {
    let Some(Value::Array(entries)) = tools else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match WireTool::deserialize(entry) {
            Ok(wire) if !wire.name.is_empty() => Some(RemoteTool::from(wire)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed tool entry");
                None
            }
        })
        .collect()
}

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_names_round_trip_through_config() {
        let config: ToolServerConfig = toml::from_str(
            r#"
            alias = "files"
            port = 9000
            transport = "bridge-rest"
            "#,
        )
        .unwrap();
        assert_eq!(config.transport, McpTransport::BridgeRest);
        assert_eq!(config.base_url().unwrap(), "http://localhost:9000");

        assert_eq!("jsonrpc".parse::<McpTransport>().unwrap(), McpTransport::JsonRpc);
        assert!("grpc".parse::<McpTransport>().is_err());
    }

    #[test]
    fn url_wins_over_port_and_is_trimmed() {
        let mut config = ToolServerConfig::new("web", "https://tools.example.com/");
        config.port = Some(1234);
        assert_eq!(config.base_url().unwrap(), "https://tools.example.com");
    }

    #[test]
    fn missing_address_is_a_config_error() {
        let config = ToolServerConfig {
            alias: "nowhere".to_string(),
            url: None,
            port: None,
            transport: McpTransport::JsonRpc,
            headers: BTreeMap::new(),
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(ToolServerConfig::new("", "http://x").validate().is_err());
        assert!(ToolServerConfig::new("ftp", "ftp://x").validate().is_err());
    }

    #[test]
    fn tools_accept_both_schema_casings() {
        let tools = json!([
            { "name": "a", "description": "first", "inputSchema": { "type": "object" } },
            { "name": "b", "input_schema": { "type": "string" } },
            { "name": "c" },
            { "description": "no name" },
            "not an object"
        ]);
        let parsed = parse_tools(Some(&tools));

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].input_schema, json!({ "type": "object" }));
        assert_eq!(parsed[1].input_schema, json!({ "type": "string" }));
        assert_eq!(parsed[1].description, "");
        assert_eq!(parsed[2].input_schema["type"], "object");
    }

    #[test]
    fn missing_tools_array_is_empty() {
        assert!(parse_tools(None).is_empty());
        assert!(parse_tools(Some(&json!({ "tools": [] }))).is_empty());
    }
}
