use crate::config::AppConfig;
use crate::services::StoreError;
use crate::services::item_store::ItemStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Inserts `field: default` unless the item already has `field`,
/// whatever its value (an explicit `null` is kept).
pub fn apply_default_partition_key(item: &mut Map<String, Value>, field: &str, default: &str) {
    item.entry(field.to_string())
        .or_insert_with(|| Value::String(default.to_string()));
}

pub struct ItemService {
    store: Arc<dyn ItemStore>,
    partition_key_field: String,
    default_partition_key: String,
}

impl ItemService {
    pub fn new(store: Arc<dyn ItemStore>, config: &AppConfig) -> Self {
        Self {
            store,
            partition_key_field: config.partition_key_path.trim_start_matches('/').to_string(),
            default_partition_key: config.default_partition_key.clone(),
        }
    }

    /// Defaults the partition key and upserts. Returns the item as sent.
    pub async fn create_item(
        &self,
        mut item: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        apply_default_partition_key(
            &mut item,
            &self.partition_key_field,
            &self.default_partition_key,
        );

        self.store.upsert_item(&item).await?;

        let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("<none>");
        info!(id, "📝 Item upserted");
        Ok(item)
    }
}
