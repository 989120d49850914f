//! Credential chains for multi-step workflows

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::credentials::CredentialManager;
use super::types::{Credential, ExecutionContext, ExecutionStatus};

/// Ordered credential ids for one workflow, with a running hash
///
/// Each recorded credential folds into the hash as
/// `sha256(previous || vc_id || output_hash)`, so altering any step changes
/// every later value. The chain is owned by the caller; the manager keeps no
/// history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialChain {
    ids: Vec<String>,
    chain_hash: String,
    steps: usize,
    failed_steps: usize,
}

impl CredentialChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step; steps without a credential still count toward the summary
    pub fn record_step(&mut self, success: bool, credential: Option<&Credential>) {
        self.steps += 1;
        if !success {
            self.failed_steps += 1;
        }
        if let Some(credential) = credential {
            self.push(credential);
        }
    }

    /// Issue the aggregate credential over the chain summary and append it
    ///
    /// Returns `None` (leaving the chain unchanged) if issuing fails.
    pub async fn finalize(
        &mut self,
        manager: &CredentialManager,
        context: &ExecutionContext,
    ) -> Option<Credential> {
        let summary = json!({
            "step_count": self.steps,
            "success": self.all_succeeded(),
            "chain_length": self.ids.len(),
            "chain_hash": self.chain_hash,
            "credential_ids": self.ids,
        });
        let status = ExecutionStatus::from_success(self.all_succeeded());
        let aggregate = manager
            .generate_credential(context, &summary, &summary, status, 0)
            .await?;
        self.push(&aggregate);
        Some(aggregate)
    }

    /// Credential ids in the order they were recorded
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn chain_hash(&self) -> &str {
        &self.chain_hash
    }

    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed_steps == 0
    }

    fn push(&mut self, credential: &Credential) {
        let mut hasher = Sha256::new();
        hasher.update(self.chain_hash.as_bytes());
        hasher.update(credential.vc_id.as_bytes());
        hasher.update(credential.output_hash.as_bytes());
        self.chain_hash = hex::encode(hasher.finalize());
        self.ids.push(credential.vc_id.clone());
    }
}
