//! Change events delivered by the live event stream

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Namespace a change belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Workflow,
    Session,
    #[default]
    Global,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Session => "session",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "workflow" => Ok(Self::Workflow),
            "session" => Ok(Self::Session),
            "global" => Ok(Self::Global),
            other => Err(Error::Config(format!("unknown event scope: {other}"))),
        }
    }
}

/// Context attached to a change by the control plane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// One change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireChangeEvent")]
pub struct ChangeEvent {
    pub id: Option<String>,
    pub key: String,
    pub data: Value,
    /// Value before the change, when the control plane reports it
    pub previous_data: Option<Value>,
    pub scope: Scope,
    pub scope_id: Option<String>,
    /// `set`, `delete`, ...
    pub action: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Agent or execution that produced the change
    pub source_id: Option<String>,
    pub metadata: EventMetadata,
}

/// Frame as sent on the wire; older senders put the source at the top level
#[derive(Deserialize)]
struct WireChangeEvent {
    #[serde(default)]
    id: Option<String>,
    key: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    previous_data: Option<Value>,
    #[serde(default)]
    scope: Scope,
    #[serde(default)]
    scope_id: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "agent_id")]
    source_id: Option<String>,
    #[serde(default)]
    metadata: EventMetadata,
}

impl From<WireChangeEvent> for ChangeEvent {
    fn from(wire: WireChangeEvent) -> Self {
        let source_id = wire.source_id.or_else(|| wire.metadata.agent_id.clone());
        Self {
            id: wire.id,
            key: wire.key,
            data: wire.data,
            previous_data: wire.previous_data,
            scope: wire.scope,
            scope_id: wire.scope_id,
            action: wire.action,
            timestamp: wire.timestamp,
            source_id,
            metadata: wire.metadata,
        }
    }
}

impl ChangeEvent {
    #[must_use]
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            key: key.into(),
            data,
            previous_data: None,
            scope: Scope::Global,
            scope_id: None,
            action: None,
            timestamp: None,
            source_id: None,
            metadata: EventMetadata::default(),
        }
    }

    #[must_use]
    pub fn scoped(mut self, scope: Scope, scope_id: impl Into<String>) -> Self {
        self.scope = scope;
        self.scope_id = Some(scope_id.into());
        self
    }
}
