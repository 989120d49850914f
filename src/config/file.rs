//! TOML configuration file loading
//!
//! Supports `~/.config/agent-node/config.toml` (or `$AGENT_NODE_CONFIG`) as a
//! persistent config source. Every section is optional; the file is an overlay
//! on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::events::EventsConfig;
use crate::mcp::ToolServerConfig;
use crate::pool::PoolConfig;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfigFile {
    /// Node identity and control plane
    #[serde(default)]
    pub node: NodeFileConfig,

    /// Outbound connection limits
    #[serde(default)]
    pub pool: PoolConfig,

    /// Tool servers and bridging
    #[serde(default)]
    pub mcp: McpFileConfig,

    /// Live event subscription
    #[serde(default)]
    pub events: EventsConfig,
}

/// `[node]` section
#[derive(Debug, Default, Deserialize)]
pub struct NodeFileConfig {
    pub id: Option<String>,
    pub control_plane_url: Option<String>,
    pub token: Option<String>,
    pub verbose: Option<bool>,
}

/// `[mcp]` section
#[derive(Debug, Default, Deserialize)]
pub struct McpFileConfig {
    /// Prefix for every bridged skill name
    pub namespace: Option<String>,

    /// Tags added to every bridged skill
    #[serde(default)]
    pub tags: Vec<String>,

    /// Re-run bridging this often; unset or zero disables it
    pub bridge_interval_secs: Option<u64>,

    /// `[[mcp.servers]]` entries
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
}

/// Load and parse the config file at `path`
///
/// A missing file yields defaults. A file that exists but cannot be read or
/// parsed is an error: a half-applied config is worse than none.
///
/// # Errors
///
/// Returns `Error::Config` if the file is unreadable or not valid TOML for this schema
pub fn load_config_file(path: Option<&Path>) -> Result<NodeConfigFile> {
    let Some(path) = path else {
        return Ok(NodeConfigFile::default());
    };
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(NodeConfigFile::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Config file path: `$AGENT_NODE_CONFIG`, else `<config dir>/agent-node/config.toml`
pub fn config_file_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(explicit) = lookup("AGENT_NODE_CONFIG").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("agent-node").join("config.toml"))
}
