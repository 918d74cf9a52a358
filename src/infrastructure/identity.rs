use crate::services::identity::{CachedCredential, DefaultAzureCredential, TokenCredential};
use std::sync::Arc;
use tracing::info;

/// Ambient credential chain with a per-scope token cache in front of it
pub fn setup_credential(http: reqwest::Client) -> Arc<dyn TokenCredential> {
    info!("🔑 Using ambient Azure credentials (environment, workload identity, managed identity, Azure CLI)");
    Arc::new(CachedCredential::new(Arc::new(DefaultAzureCredential::new(
        http,
    ))))
}
