//! Materialize remote tools as local skills

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use super::client::McpClient;
use super::registry::McpRegistry;
use super::types::RemoteTool;
use crate::Result;
use crate::dispatch::{Callable, CallableOptions, DispatchRegistry, handler};

/// Tag carried by every bridged skill
pub const BRIDGE_TAG: &str = "mcp";

const FALLBACK_NAME: &str = "mcp_tool";
const DIGIT_PREFIX: &str = "mcp_";

/// One remote tool registered as a local skill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgedCallable {
    pub skill_name: String,
    pub server: String,
    pub tool: String,
}

/// Drives bridging passes from an [`McpRegistry`] into a [`DispatchRegistry`]
///
/// Passes are re-runnable: a name bridged before, or already taken in the
/// dispatch registry, is skipped.
#[derive(Debug, Default)]
pub struct McpBridge {
    namespace: Option<String>,
    tags: Vec<String>,
    verbose: bool,
    bridged: Mutex<HashSet<String>>,
}

impl McpBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every skill name with `namespace`
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.trim().is_empty()).then_some(namespace);
        self
    }

    /// Extra tags appended after the bridge tag and alias
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Derived skill name for a tool on `alias`
    #[must_use]
    pub fn skill_name(&self, alias: &str, tool: &str) -> String {
        let joined = match &self.namespace {
            Some(namespace) => format!("{namespace}_{alias}_{tool}"),
            None => format!("{alias}_{tool}"),
        };
        sanitize_skill_name(&joined)
    }

    /// Names bridged by earlier passes
    #[must_use]
    pub fn bridged_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bridged.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Run one bridging pass
    ///
    /// Servers are health-checked concurrently; a server's tools are listed only after
    /// its health check passes. Returns the bridgings made by this pass.
    pub async fn bridge(
        &self,
        servers: &McpRegistry,
        dispatch: &DispatchRegistry,
    ) -> Vec<BridgedCallable> {
        let discoveries = join_all(servers.clients().into_iter().map(|client| async move {
            if !client.health_check().await {
                if self.verbose {
                    tracing::info!(alias = %client.alias(), "skipping unhealthy tool server");
                } else {
                    tracing::debug!(alias = %client.alias(), "skipping unhealthy tool server");
                }
                return (client, Vec::new());
            }
            let tools = client.list_tools().await;
            (client, tools)
        }))
        .await;

        let mut made = Vec::new();
        for (client, tools) in discoveries {
            for tool in tools {
                match self.bridge_tool(&client, tool, dispatch) {
                    Ok(Some(bridged)) => made.push(bridged),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            alias = %client.alias(),
                            error = %e,
                            "failed to bridge tool"
                        );
                    }
                }
            }
        }

        if !made.is_empty() {
            tracing::info!(count = made.len(), "bridged remote tools");
        }
        made
    }

    fn bridge_tool(
        &self,
        client: &Arc<McpClient>,
        tool: RemoteTool,
        dispatch: &DispatchRegistry,
    ) -> Result<Option<BridgedCallable>> {
        let alias = client.alias().to_string();
        let skill_name = self.skill_name(&alias, &tool.name);

        if self.bridged.lock().contains(&skill_name) || dispatch.contains(&skill_name) {
            tracing::debug!(skill = %skill_name, "already registered, skipping");
            return Ok(None);
        }

        let mut tags = vec![BRIDGE_TAG.to_string(), alias.clone()];
        tags.extend(self.tags.iter().cloned());
        let mut options = CallableOptions::new()
            .tags(tags)
            .input_schema(tool.input_schema.clone());
        if !tool.description.is_empty() {
            options = options.description(tool.description.clone());
        }

        let forward = Arc::clone(client);
        let tool_name = tool.name.clone();
        let callable = Callable::skill(
            skill_name.clone(),
            handler(move |invocation| {
                let client = Arc::clone(&forward);
                let tool = tool_name.clone();
                async move {
                    let result = client.call_tool(&tool, invocation.input).await?;
                    Ok(json!({
                        "status": "success",
                        "result": result,
                        "server": client.alias(),
                        "tool": tool,
                    }))
                }
            }),
            options,
        )?;

        if !dispatch.register_if_absent(callable) {
            return Ok(None);
        }
        self.bridged.lock().insert(skill_name.clone());
        tracing::debug!(skill = %skill_name, alias = %alias, tool = %tool.name, "tool bridged");

        Ok(Some(BridgedCallable {
            skill_name,
            server: alias,
            tool: tool.name,
        }))
    }
}

/// Reduce a joined name to a valid callable identifier
///
/// Characters outside `[A-Za-z0-9_]` are dropped, underscore runs collapse,
/// edges are trimmed. A leading digit gets the `mcp_` prefix and an empty
/// result becomes `mcp_tool`.
#[must_use]
pub fn sanitize_skill_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('_');
    match trimmed.chars().next() {
        None => FALLBACK_NAME.to_string(),
        Some(c) if c.is_ascii_digit() => format!("{DIGIT_PREFIX}{trimmed}"),
        Some(_) => trimmed.to_string(),
    }
}
