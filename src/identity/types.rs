//! Identity and credential records exchanged with the control plane

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// One DID with its key material
#[derive(Debug, Deserialize)]
pub struct DidIdentity {
    pub did: String,
    #[serde(default, deserialize_with = "secret")]
    pub private_key_jwk: Option<SecretString>,
    #[serde(default)]
    pub public_key_jwk: Option<String>,
    #[serde(default)]
    pub derivation_path: Option<String>,
    #[serde(default)]
    pub component_type: Option<String>,
}

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Identities issued to this node and each of its callables
#[derive(Debug, Deserialize)]
pub struct IdentityPackage {
    pub agent_did: DidIdentity,
    #[serde(default)]
    pub bot_dids: HashMap<String, DidIdentity>,
    #[serde(default)]
    pub skill_dids: HashMap<String, DidIdentity>,
    #[serde(default, alias = "playground_server_id")]
    pub server_id: Option<String>,
}

impl IdentityPackage {
    /// DID for a bot or skill, falling back to the agent DID
    #[must_use]
    pub fn function_did(&self, name: &str) -> &str {
        self.bot_dids
            .get(name)
            .or_else(|| self.skill_dids.get(name))
            .map_or(self.agent_did.did.as_str(), |identity| identity.did.as_str())
    }
}

/// Caller/target identities for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub caller_did: String,
    pub target_did: String,
    pub agent_node_did: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome recorded in a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    #[must_use]
    pub const fn from_success(success: bool) -> Self {
        if success { Self::Succeeded } else { Self::Failed }
    }
}

/// Audit record for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub vc_id: String,
    #[serde(default)]
    pub execution_id: String,
    #[serde(default)]
    pub input_hash: String,
    #[serde(default)]
    pub output_hash: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub issuer_did: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Introspection view of the credential manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub enabled: bool,
    pub node_id: String,
    pub agent_did: Option<String>,
    pub bot_count: usize,
    pub skill_count: usize,
    pub server_id: Option<String>,
}
