use crate::config::AppConfig;
use crate::services::identity::TokenCredential;
use crate::services::{Provisioned, StoreError, check_response, ms_date};
use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

const COSMOS_API_VERSION: &str = "2018-12-31";

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Create the database and container when they do not exist yet
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Insert or replace an item, returning the stored document
    async fn upsert_item(&self, item: &Map<String, Value>) -> Result<Value, StoreError>;
}

/// Cosmos DB (SQL API) REST client authenticated with Azure AD tokens
pub struct CosmosItemStore {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    scope: String,
    database: String,
    container: String,
    partition_key_path: String,
    offer_throughput: u32,
}

impl CosmosItemStore {
    pub fn new(
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        config: &AppConfig,
    ) -> Self {
        Self {
            http,
            credential,
            endpoint: config.cosmos_endpoint.trim_end_matches('/').to_string(),
            scope: config.cosmos_scope(),
            database: config.database_name.clone(),
            container: config.container_name.clone(),
            partition_key_path: config.partition_key_path.clone(),
            offer_throughput: config.offer_throughput,
        }
    }

    /// Top-level property name behind the partition key path
    fn partition_key_field(&self) -> &str {
        self.partition_key_path.trim_start_matches('/')
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, StoreError> {
        let token = self.credential.get_token(&self.scope).await?;
        let auth = format!("type=aad&ver=1.0&sig={}", token.token);

        Ok(self
            .http
            .request(method, format!("{}/{}", self.endpoint, path))
            .header(
                reqwest::header::AUTHORIZATION,
                utf8_percent_encode(&auth, NON_ALPHANUMERIC).to_string(),
            )
            .header("x-ms-date", ms_date())
            .header("x-ms-version", COSMOS_API_VERSION)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    /// GET the resource; on 404 POST `body` to its parent feed
    async fn ensure_resource(
        &self,
        resource_path: &str,
        feed_path: &str,
        body: Value,
        throughput: Option<u32>,
    ) -> Result<Provisioned, StoreError> {
        let response = self
            .request(reqwest::Method::GET, resource_path)
            .await?
            .send()
            .await?;
        match check_response(response).await {
            Ok(_) => return Ok(Provisioned::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut create = self
            .request(reqwest::Method::POST, feed_path)
            .await?
            .json(&body);
        if let Some(ru) = throughput {
            create = create.header("x-ms-offer-throughput", ru.to_string());
        }

        match check_response(create.send().await?).await {
            Ok(_) => Ok(Provisioned::Created),
            // Lost a race with another instance
            Err(e) if e.is_conflict() => Ok(Provisioned::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

/// `x-ms-documentdb-partitionkey` value: a one-element JSON array, ASCII only.
/// An absent key is sent as `[{}]`.
pub fn partition_key_header(value: Option<&Value>) -> String {
    let array = match value {
        Some(v) => Value::Array(vec![v.clone()]),
        None => json!([{}]),
    };
    escape_non_ascii(&array.to_string())
}

/// Header values must be visible ASCII; JSON allows `\u` escapes instead.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[async_trait]
impl ItemStore for CosmosItemStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        let database_path = format!("dbs/{}", self.database);
        let outcome = self
            .ensure_resource(&database_path, "dbs", json!({ "id": self.database }), None)
            .await?;
        info!("🗄️  Cosmos database '{}': {:?}", self.database, outcome);

        let container_path = format!("{}/colls/{}", database_path, self.container);
        let outcome = self
            .ensure_resource(
                &container_path,
                &format!("{}/colls", database_path),
                json!({
                    "id": self.container,
                    "partitionKey": {
                        "paths": [self.partition_key_path],
                        "kind": "Hash",
                        "version": 2
                    }
                }),
                Some(self.offer_throughput),
            )
            .await?;
        info!("🗄️  Cosmos container '{}': {:?}", self.container, outcome);

        Ok(())
    }

    async fn upsert_item(&self, item: &Map<String, Value>) -> Result<Value, StoreError> {
        let partition_key = partition_key_header(item.get(self.partition_key_field()));
        debug!(partition_key = %partition_key, "Upserting item");

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("dbs/{}/colls/{}/docs", self.database, self.container),
            )
            .await?
            .header("x-ms-documentdb-is-upsert", "True")
            .header("x-ms-documentdb-partitionkey", partition_key)
            .json(item)
            .send()
            .await?;

        let stored = check_response(response).await?.json::<Value>().await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_header_string() {
        assert_eq!(partition_key_header(Some(&json!("default"))), r#"["default"]"#);
    }

    #[test]
    fn test_partition_key_header_non_string_values() {
        assert_eq!(partition_key_header(Some(&json!(42))), "[42]");
        assert_eq!(partition_key_header(Some(&Value::Null)), "[null]");
        assert_eq!(partition_key_header(None), "[{}]");
    }

    #[test]
    fn test_partition_key_header_escapes_non_ascii() {
        assert_eq!(partition_key_header(Some(&json!("çay"))), r#"["\u00e7ay"]"#);
        // Outside the BMP: surrogate pair
        assert_eq!(
            partition_key_header(Some(&json!("🚀"))),
            r#"["\ud83d\ude80"]"#
        );
    }
}
