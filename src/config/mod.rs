//! Configuration management for the agent node
//!
//! Values resolve env > TOML file > default. Environment lookup is a closure
//! so callers (and tests) can supply their own source.

pub mod file;

use std::collections::HashSet;
use std::time::Duration;

use secrecy::SecretString;

use crate::events::EventsConfig;
use crate::mcp::ToolServerConfig;
use crate::pool::PoolConfig;
use crate::{Error, Result};

/// Control plane used when none is configured
pub const DEFAULT_CONTROL_PLANE_URL: &str = "http://localhost:8080";

/// Node id used when neither config nor the host name provide one
const FALLBACK_NODE_ID: &str = "agent-node";

/// Agent node configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier registered with the control plane
    pub node_id: String,

    /// Control plane base URL (identity, credentials, events)
    pub control_plane_url: String,

    /// Bearer token forwarded to the control plane
    pub token: Option<SecretString>,

    /// Log skipped tool servers and similar detail at info level
    pub verbose: bool,

    /// Outbound connection limits
    pub pool: PoolConfig,

    /// Tool servers and bridging
    pub mcp: McpConfig,

    /// Live event subscription
    pub events: EventsConfig,
}

/// Tool-server bridging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpConfig {
    /// Prefix for every bridged skill name
    pub namespace: Option<String>,

    /// Tags added to every bridged skill
    pub tags: Vec<String>,

    /// Periodic re-bridging; `None` bridges once at startup
    pub bridge_interval: Option<Duration>,

    pub servers: Vec<ToolServerConfig>,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the config file is malformed or validation fails
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration reading environment variables through `lookup`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the config file is malformed or validation fails
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = file::config_file_path(&lookup);
        let fc = file::load_config_file(path.as_deref())?;
        Self::from_parts(fc, lookup)
    }

    /// Resolve a parsed config file against environment overrides
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if validation fails
    pub fn from_parts<F>(fc: file::NodeConfigFile, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| {
            env(key).map(|v| {
                v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
            })
        };

        let node_id = env("AGENT_NODE_ID")
            .or(fc.node.id)
            .unwrap_or_else(default_node_id);

        let control_plane_url = env("AGENT_NODE_CONTROL_PLANE_URL")
            .or(fc.node.control_plane_url)
            .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let token = env("AGENT_NODE_TOKEN")
            .or(fc.node.token)
            .map(SecretString::from);

        let verbose = flag("AGENT_NODE_VERBOSE")
            .or(fc.node.verbose)
            .unwrap_or(false);

        let mut events = fc.events;
        if let Some(enabled) = flag("AGENT_NODE_EVENTS_ENABLED") {
            events.enabled = enabled;
        }

        let mcp = McpConfig {
            namespace: fc.mcp.namespace.filter(|n| !n.trim().is_empty()),
            tags: fc.mcp.tags,
            bridge_interval: fc
                .mcp
                .bridge_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            servers: fc.mcp.servers,
        };

        let config = Self {
            node_id,
            control_plane_url,
            token,
            verbose,
            pool: fc.pool,
            mcp,
            events,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast checks on the resolved configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(Error::Config("node id must not be empty".to_string()));
        }
        url::Url::parse(&self.control_plane_url).map_err(|e| {
            Error::Config(format!(
                "invalid control plane url {:?}: {e}",
                self.control_plane_url
            ))
        })?;

        self.pool.validate()?;
        self.events.validate()?;

        let mut aliases = HashSet::new();
        for server in &self.mcp.servers {
            server.validate()?;
            if !aliases.insert(server.alias.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate tool server alias: {}",
                    server.alias
                )));
            }
        }
        Ok(())
    }
}

fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_NODE_ID.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn parse(toml: &str) -> file::NodeConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::from_parts(file::NodeConfigFile::default(), lookup(&[])).unwrap();
        assert!(!config.node_id.is_empty());
        assert_eq!(config.control_plane_url, DEFAULT_CONTROL_PLANE_URL);
        assert!(config.token.is_none());
        assert!(!config.verbose);
        assert!(config.mcp.servers.is_empty());
        assert!(config.mcp.bridge_interval.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let fc = parse(
            r#"
            [node]
            id = "from-file"
            control_plane_url = "http://file.example"
            verbose = false

            [events]
            enabled = false
            "#,
        );
        let config = Config::from_parts(
            fc,
            lookup(&[
                ("AGENT_NODE_ID", "from-env"),
                ("AGENT_NODE_CONTROL_PLANE_URL", "http://env.example/"),
                ("AGENT_NODE_TOKEN", "secret"),
                ("AGENT_NODE_VERBOSE", "true"),
                ("AGENT_NODE_EVENTS_ENABLED", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.node_id, "from-env");
        assert_eq!(config.control_plane_url, "http://env.example");
        assert_eq!(
            config.token.as_ref().map(|t| t.expose_secret()),
            Some("secret")
        );
        assert!(config.verbose);
        assert!(config.events.enabled);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let fc = parse("[node]\nid = \"from-file\"");
        let config = Config::from_parts(fc, lookup(&[("AGENT_NODE_ID", "  ")])).unwrap();
        assert_eq!(config.node_id, "from-file");
    }

    #[test]
    fn duplicate_aliases_fail_fast() {
        let fc = parse(
            r#"
            [[mcp.servers]]
            alias = "files"
            port = 9000

            [[mcp.servers]]
            alias = "files"
            port = 9001
            "#,
        );
        assert!(matches!(
            Config::from_parts(fc, lookup(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn server_without_address_fails_fast() {
        let fc = parse("[[mcp.servers]]\nalias = \"nowhere\"");
        assert!(Config::from_parts(fc, lookup(&[])).is_err());
    }

    #[test]
    fn zero_interval_disables_rebridging() {
        let fc = parse("[mcp]\nbridge_interval_secs = 0");
        let config = Config::from_parts(fc, lookup(&[])).unwrap();
        assert!(config.mcp.bridge_interval.is_none());

        let fc = parse("[mcp]\nbridge_interval_secs = 300");
        let config = Config::from_parts(fc, lookup(&[])).unwrap();
        assert_eq!(config.mcp.bridge_interval, Some(Duration::from_secs(300)));
    }
}
