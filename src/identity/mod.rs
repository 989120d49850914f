//! Node identity (DIDs) and audit credentials

mod chain;
mod credentials;
mod types;

pub use chain::CredentialChain;
pub use credentials::{CredentialManager, content_hash};
pub use types::{
    Credential, DidIdentity, ExecutionContext, ExecutionStatus, IdentityPackage, IdentitySummary,
};
