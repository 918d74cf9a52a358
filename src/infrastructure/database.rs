use crate::config::AppConfig;
use crate::services::identity::TokenCredential;
use crate::services::item_store::{CosmosItemStore, ItemStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_item_store(
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn ItemStore>> {
    info!(
        "🌐 Cosmos DB: {} (Database: {}, Container: {})",
        config.cosmos_endpoint, config.database_name, config.container_name
    );

    let store = CosmosItemStore::new(http, credential, config);
    ensure_item_store(&store, config.skip_provisioning).await?;

    Ok(Arc::new(store))
}

/// Only "already exists" is tolerated; any other failure aborts startup.
pub async fn ensure_item_store(store: &dyn ItemStore, skip: bool) -> anyhow::Result<()> {
    if skip {
        info!("⏭️  Skipping Cosmos DB provisioning");
        return Ok(());
    }

    store
        .ensure_ready()
        .await
        .context("Failed to provision Cosmos DB database/container")?;
    info!("✅ Cosmos DB container is ready");
    Ok(())
}
