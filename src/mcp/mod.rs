//! Tool-server (MCP) bridging
//!
//! Each configured server gets an [`McpClient`] speaking either the JSON-RPC
//! or the REST dialect. [`McpRegistry`] holds the clients by alias and
//! aggregates health; [`McpBridge`] registers every discovered tool as a
//! skill in the dispatch registry.

mod bridge;
mod client;
mod registry;
mod types;

pub use bridge::{BRIDGE_TAG, BridgedCallable, McpBridge, sanitize_skill_name};
pub use client::{HealthRecord, McpClient};
pub use registry::{HealthStatus, HealthSummary, McpRegistry, ServerStatus};
pub use types::{McpTransport, RemoteTool, ToolServerConfig, parse_tools};
