use crate::config::AppConfig;
use crate::services::Provisioned;
use crate::services::blob_store::{AzureBlobStore, BlobStore};
use crate::services::identity::TokenCredential;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_blob_store(
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    info!(
        "☁️  Blob Storage: {} (Container: {})",
        config.blob_endpoint, config.blob_container
    );

    let store = AzureBlobStore::new(http, credential, config);
    ensure_blob_container(&store, &config.blob_container, config.skip_provisioning).await?;

    Ok(Arc::new(store))
}

/// Only "already exists" is tolerated; any other failure aborts startup.
pub async fn ensure_blob_container(
    store: &dyn BlobStore,
    container: &str,
    skip: bool,
) -> anyhow::Result<()> {
    if skip {
        info!("⏭️  Skipping blob container provisioning");
        return Ok(());
    }

    match store
        .ensure_container()
        .await
        .with_context(|| format!("Failed to create blob container '{}'", container))?
    {
        Provisioned::Created => info!("🪣 Container '{}' created successfully", container),
        Provisioned::AlreadyExists => info!("✅ Container '{}' is ready", container),
    }
    Ok(())
}
