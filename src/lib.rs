//! Agent Node - runtime core for a callable, auditable, tool-augmented agent
//!
//! This library provides:
//! - A dispatch registry of named bots and skills, with prefixed router groups
//! - Tool-server (MCP) clients and bridging of remote tools into the registry
//! - Identity registration and hash-chained audit credentials
//! - A reconnecting subscription to the control plane's change events
//! - One bounded, keep-alive HTTP pool shared by all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 External callers                     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ invoke(name)
//! ┌────────────────────▼────────────────────────────────┐
//! │   Dispatch Registry  ◄── McpBridge ◄── McpRegistry   │
//! │          │                                 │         │
//! │   CredentialManager (audit)          McpClient × N   │
//! └──────────┬─────────────────────────────────┬────────┘
//!            │                                 │
//! ┌──────────▼─────────────────────────────────▼────────┐
//! │                 Connection Pool                      │
//! └─────────────────────────────────────────────────────┘
//!
//!   EventClient ── ws ──► control plane event stream
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod identity;
pub mod mcp;
pub mod node;
pub mod pool;

pub use config::Config;
pub use dispatch::{
    Callable, CallableKind, CallableOptions, DispatchRegistry, Invocation, RouterGroup, handler,
};
pub use error::{Error, Result};
pub use events::{ChangeEvent, EventClient, EventFilter, EventsConfig, Scope, event_handler};
pub use identity::{Credential, CredentialChain, CredentialManager, IdentityPackage};
pub use mcp::{
    BridgedCallable, HealthStatus, HealthSummary, McpBridge, McpClient, McpRegistry, McpTransport,
    ToolServerConfig,
};
pub use node::{Node, StartReport};
pub use pool::{ConnectionPool, PoolConfig};
