use anyhow::{Context, Result, anyhow};
use std::env;

/// Runtime configuration for the gateway
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Cosmos DB account endpoint, e.g. `https://myaccount.documents.azure.com:443/`
    pub cosmos_endpoint: String,

    /// Cosmos DB database id (default: "appdb")
    pub database_name: String,

    /// Cosmos DB container id (default: "items")
    pub container_name: String,

    /// Partition key path used when the container is created (default: "/partitionKey")
    pub partition_key_path: String,

    /// Provisioned throughput in RU/s when the container is created (default: 400)
    pub offer_throughput: u32,

    /// Value stored in `partitionKey` when a client omits it (default: "default")
    pub default_partition_key: String,

    /// Blob service endpoint (default: `https://<STORAGE_ACCOUNT_NAME>.blob.core.windows.net`)
    pub blob_endpoint: String,

    /// Blob container receiving uploads (default: "uploads")
    pub blob_container: String,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_upload_size: usize,

    /// Skip creating the database and containers at startup (default: false)
    pub skip_provisioning: bool,

    /// Allowed CORS origins (comma separated, empty means any)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cosmos_endpoint: "https://localhost:8081".to_string(),
            database_name: "appdb".to_string(),
            container_name: "items".to_string(),
            partition_key_path: "/partitionKey".to_string(),
            offer_throughput: 400,
            default_partition_key: "default".to_string(),
            blob_endpoint: "http://127.0.0.1:10000/devstoreaccount1".to_string(),
            blob_container: "uploads".to_string(),
            max_upload_size: 256 * 1024 * 1024, // 256 MB
            skip_provisioning: false,
            allowed_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// `COSMOS_ENDPOINT` is required, and so is either `STORAGE_ACCOUNT_NAME`
    /// or `BLOB_ENDPOINT`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let cosmos_endpoint = lookup("COSMOS_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("COSMOS_ENDPOINT must be set"))?;
        url::Url::parse(&cosmos_endpoint)
            .with_context(|| format!("COSMOS_ENDPOINT is not a valid URL: {cosmos_endpoint}"))?;

        let blob_endpoint = match lookup("BLOB_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            Some(endpoint) => endpoint,
            None => {
                let account = lookup("STORAGE_ACCOUNT_NAME")
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        anyhow!("STORAGE_ACCOUNT_NAME must be set (or BLOB_ENDPOINT)")
                    })?;
                blob_endpoint_for_account(&account)
            }
        };
        url::Url::parse(&blob_endpoint)
            .with_context(|| format!("Blob endpoint is not a valid URL: {blob_endpoint}"))?;

        Ok(Self {
            cosmos_endpoint,

            database_name: lookup("COSMOS_DATABASE").unwrap_or(default.database_name),

            container_name: lookup("COSMOS_CONTAINER").unwrap_or(default.container_name),

            partition_key_path: default.partition_key_path,

            offer_throughput: lookup("COSMOS_THROUGHPUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.offer_throughput),

            default_partition_key: lookup("DEFAULT_PARTITION_KEY")
                .unwrap_or(default.default_partition_key),

            blob_endpoint,

            blob_container: lookup("BLOB_CONTAINER").unwrap_or(default.blob_container),

            max_upload_size: lookup("MAX_UPLOAD_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            skip_provisioning: lookup("SKIP_PROVISIONING")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.skip_provisioning),

            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),
        })
    }

    /// AAD scope for the Cosmos DB data plane
    pub fn cosmos_scope(&self) -> String {
        scope_for_resource(&self.cosmos_endpoint)
    }
}

pub fn blob_endpoint_for_account(account: &str) -> String {
    format!("https://{}.blob.core.windows.net", account.trim())
}

/// `https://host:443/` becomes `https://host/.default`
fn scope_for_resource(endpoint: &str) -> String {
    match url::Url::parse(endpoint) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}/.default", url.scheme(), host),
            None => format!("{}/.default", endpoint.trim_end_matches('/')),
        },
        Err(_) => format!("{}/.default", endpoint.trim_end_matches('/')),
    }
}
