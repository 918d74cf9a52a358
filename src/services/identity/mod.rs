//! Ambient Azure AD credentials.
//!
//! Tokens are resolved from whatever the hosting environment provides:
//! service principal variables, a federated workload identity, the managed
//! identity endpoint, or a local `az login`. [`DefaultAzureCredential`] tries
//! them in that order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

pub mod azure_cli;
pub mod cache;
pub mod client_credentials;
pub mod managed_identity;

pub use azure_cli::AzureCliCredential;
pub use cache::CachedCredential;
pub use client_credentials::{EnvironmentCredential, WorkloadIdentityCredential};
pub use managed_identity::ManagedIdentityCredential;

/// Scope for the Blob service data plane
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("{0} is not configured in this environment")]
    NotConfigured(&'static str),

    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Response { status: u16, body: String },

    #[error("Unexpected token response: {0}")]
    InvalidResponse(String),

    #[error("Credential process failed: {0}")]
    Process(String),

    #[error("No credential in the chain produced a token: {}", .0.join("; "))]
    Chain(Vec<String>),
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short name used in logs and chain errors
    fn name(&self) -> &'static str;

    /// Fetch an access token for a single `.default` scope
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

/// Tries each credential in order and returns the first token obtained.
pub struct DefaultAzureCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl DefaultAzureCredential {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_sources(vec![
            Arc::new(EnvironmentCredential::from_env(http.clone())),
            Arc::new(WorkloadIdentityCredential::from_env(http.clone())),
            Arc::new(ManagedIdentityCredential::from_env(http)),
            Arc::new(AzureCliCredential::new()),
        ])
    }

    pub fn with_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    fn name(&self) -> &'static str {
        "DefaultAzureCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    tracing::debug!(credential = source.name(), scope, "Acquired access token");
                    return Ok(token);
                }
                Err(CredentialError::NotConfigured(_)) => {
                    tracing::trace!(credential = source.name(), "Credential not configured, skipping");
                    failures.push(format!("{}: not configured", source.name()));
                }
                Err(e) => {
                    tracing::debug!(credential = source.name(), error = %e, "Credential failed");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        Err(CredentialError::Chain(failures))
    }
}
