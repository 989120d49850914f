//! Identity registration and per-invocation credentials

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::types::{
    Credential, ExecutionContext, ExecutionStatus, IdentityPackage, IdentitySummary,
};
use crate::dispatch::Invocation;
use crate::pool::ConnectionPool;
use crate::{Error, Result};

const REGISTER_PATH: &str = "/api/v1/did/register";
const CREDENTIAL_PATH: &str = "/api/v1/execution/vc";

#[derive(Debug, Serialize)]
struct FunctionRef<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    agent_node_id: &'a str,
    bots: Vec<FunctionRef<'a>>,
    skills: Vec<FunctionRef<'a>>,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    identity_package: Option<IdentityPackage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CredentialRequest<'a> {
    execution_context: &'a ExecutionContext,
    input_data: String,
    output_data: String,
    status: ExecutionStatus,
    duration_ms: u64,
}

/// Hex SHA-256 of a value's compact JSON form
#[must_use]
pub fn content_hash(value: &Value) -> String {
    hex::encode(Sha256::digest(value.to_string().as_bytes()))
}

/// Registers the node's identity and issues audit credentials
///
/// Nothing here is fatal: a failed registration leaves the manager disabled
/// and a failed credential request yields `None`.
#[derive(Debug)]
pub struct CredentialManager {
    control_plane_url: String,
    node_id: String,
    token: Option<SecretString>,
    pool: Arc<ConnectionPool>,
    identity: RwLock<Option<Arc<IdentityPackage>>>,
    enabled: AtomicBool,
}

impl CredentialManager {
    #[must_use]
    pub fn new(
        control_plane_url: impl Into<String>,
        node_id: impl Into<String>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            control_plane_url: control_plane_url.into().trim_end_matches('/').to_string(),
            node_id: node_id.into(),
            token: None,
            pool,
            identity: RwLock::new(None),
            enabled: AtomicBool::new(false),
        }
    }

    /// Bearer token sent with every control-plane request
    #[must_use]
    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Current identity package, if registration succeeded
    #[must_use]
    pub fn identity(&self) -> Option<Arc<IdentityPackage>> {
        self.identity.read().clone()
    }

    /// Register the node and its callables; returns whether credentials are enabled
    pub async fn register_node(&self, bots: &[String], skills: &[String]) -> bool {
        match self.try_register(bots, skills).await {
            Ok(package) => {
                tracing::info!(
                    node_id = %self.node_id,
                    agent_did = %package.agent_did.did,
                    bots = package.bot_dids.len(),
                    skills = package.skill_dids.len(),
                    "identity registered"
                );
                *self.identity.write() = Some(Arc::new(package));
                self.enabled.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                tracing::warn!(
                    node_id = %self.node_id,
                    error = %e,
                    "identity registration failed, credentials disabled"
                );
                false
            }
        }
    }

    /// Register the node, surfacing failures
    ///
    /// # Errors
    ///
    /// Returns `Error::Identity` if the control plane rejects the registration
    pub async fn try_register(
        &self,
        bots: &[String],
        skills: &[String],
    ) -> Result<IdentityPackage> {
        let body = RegistrationRequest {
            agent_node_id: &self.node_id,
            bots: bots.iter().map(|id| FunctionRef { id }).collect(),
            skills: skills.iter().map(|id| FunctionRef { id }).collect(),
        };
        let response = self
            .pool
            .execute(self.post(REGISTER_PATH).json(&body))
            .await?;
        if !response.is_success() {
            return Err(Error::Identity(format!(
                "registration returned {}: {}",
                response.status,
                response.text()
            )));
        }

        let parsed: RegistrationResponse = response.json()?;
        match parsed.identity_package {
            Some(package) if parsed.success => Ok(package),
            _ => Err(Error::Identity(
                parsed
                    .error
                    .unwrap_or_else(|| "registration rejected".to_string()),
            )),
        }
    }

    #[must_use]
    pub fn agent_did(&self) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .map(|package| package.agent_did.did.clone())
    }

    /// DID for a bot or skill; unknown names resolve to the agent DID
    #[must_use]
    pub fn function_did(&self, name: &str) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .map(|package| package.function_did(name).to_string())
    }

    /// Resolve caller and target identities for an invocation
    ///
    /// Returns `None` until an identity package exists.
    #[must_use]
    pub fn create_execution_context(
        &self,
        invocation: &Invocation,
        caller: &str,
        target: &str,
    ) -> Option<ExecutionContext> {
        let identity = self.identity.read();
        let package = identity.as_ref()?;
        Some(ExecutionContext {
            execution_id: invocation.execution_id.clone(),
            workflow_id: invocation.workflow_id.clone(),
            session_id: invocation.session_id.clone(),
            caller_did: package.function_did(caller).to_string(),
            target_did: package.function_did(target).to_string(),
            agent_node_did: package.agent_did.did.clone(),
            timestamp: Utc::now(),
        })
    }

    #[must_use]
    pub fn identity_summary(&self) -> IdentitySummary {
        let identity = self.identity.read();
        IdentitySummary {
            enabled: self.is_enabled(),
            node_id: self.node_id.clone(),
            agent_did: identity.as_ref().map(|p| p.agent_did.did.clone()),
            bot_count: identity.as_ref().map_or(0, |p| p.bot_dids.len()),
            skill_count: identity.as_ref().map_or(0, |p| p.skill_dids.len()),
            server_id: identity.as_ref().and_then(|p| p.server_id.clone()),
        }
    }

    /// Request a credential for one invocation; failures are logged and yield `None`
    pub async fn generate_credential(
        &self,
        context: &ExecutionContext,
        input: &Value,
        output: &Value,
        status: ExecutionStatus,
        duration_ms: u64,
    ) -> Option<Credential> {
        if !self.is_enabled() {
            return None;
        }
        match self
            .try_generate_credential(context, input, output, status, duration_ms)
            .await
        {
            Ok(credential) => {
                tracing::debug!(
                    execution_id = %context.execution_id,
                    vc_id = %credential.vc_id,
                    "credential issued"
                );
                Some(credential)
            }
            Err(e) => {
                tracing::warn!(
                    execution_id = %context.execution_id,
                    error = %e,
                    "credential generation failed"
                );
                None
            }
        }
    }

    /// Request a credential, surfacing failures
    ///
    /// Hashes missing from the response are filled with locally computed ones.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx response
    pub async fn try_generate_credential(
        &self,
        context: &ExecutionContext,
        input: &Value,
        output: &Value,
        status: ExecutionStatus,
        duration_ms: u64,
    ) -> Result<Credential> {
        let body = CredentialRequest {
            execution_context: context,
            input_data: BASE64.encode(input.to_string()),
            output_data: BASE64.encode(output.to_string()),
            status,
            duration_ms,
        };
        let response = self
            .pool
            .execute(self.post(CREDENTIAL_PATH).json(&body))
            .await?;
        if !response.is_success() {
            return Err(Error::Credential(format!(
                "credential request returned {}: {}",
                response.status,
                response.text()
            )));
        }

        let mut credential: Credential = response.json()?;
        if credential.input_hash.is_empty() {
            credential.input_hash = content_hash(input);
        }
        if credential.output_hash.is_empty() {
            credential.output_hash = content_hash(output);
        }
        if credential.execution_id.is_empty() {
            credential.execution_id.clone_from(&context.execution_id);
        }
        if credential.duration_ms == 0 {
            credential.duration_ms = duration_ms;
        }
        Ok(credential)
    }

    /// Run `operation` and issue a credential for it
    ///
    /// The operation's result is returned untouched; the credential is `None`
    /// when there is no context or issuing fails.
    pub async fn audit<F>(
        &self,
        context: Option<&ExecutionContext>,
        input: &Value,
        operation: F,
    ) -> (Result<Value>, Option<Credential>)
    where
        F: Future<Output = Result<Value>>,
    {
        let started = Instant::now();
        let result = operation.await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let Some(context) = context else {
            return (result, None);
        };
        let (output, status) = match &result {
            Ok(value) => (value.clone(), ExecutionStatus::Succeeded),
            Err(e) => (json!({ "error": e.to_string() }), ExecutionStatus::Failed),
        };
        let credential = self
            .generate_credential(context, input, &output, status, duration_ms)
            .await;
        (result, credential)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .pool
            .client()
            .post(format!("{}{path}", self.control_plane_url));
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}
