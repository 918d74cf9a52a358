use crate::config::AppConfig;
use crate::services::identity::{STORAGE_SCOPE, TokenCredential};
use crate::services::{Provisioned, StoreError, check_response, ms_date};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;

const BLOB_API_VERSION: &str = "2021-08-06";

/// Unreserved characters stay readable in blob URLs
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the upload container; an existing container is not an error
    async fn ensure_container(&self) -> Result<Provisioned, StoreError>;

    /// Store `data` as a block blob named `name`, overwriting any existing blob
    async fn upload_blob(&self, name: &str, data: Bytes, content_type: &str)
    -> Result<(), StoreError>;
}

pub struct AzureBlobStore {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    container: String,
}

impl AzureBlobStore {
    pub fn new(
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        config: &AppConfig,
    ) -> Self {
        Self {
            http,
            credential,
            endpoint: config.blob_endpoint.trim_end_matches('/').to_string(),
            container: config.blob_container.clone(),
        }
    }

    pub fn blob_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, encode_blob_name(name))
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: String,
    ) -> Result<reqwest::RequestBuilder, StoreError> {
        let token = self.credential.get_token(STORAGE_SCOPE).await?;

        Ok(self
            .http
            .request(method, url)
            .bearer_auth(&token.token)
            .header("x-ms-date", ms_date())
            .header("x-ms-version", BLOB_API_VERSION))
    }
}

/// Blob names must be non-empty and free of `.`/`..` segments: URL
/// normalization would otherwise collapse them, storing the blob under a
/// different name or outside the container.
pub fn validate_blob_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidRequest("Blob name is empty".to_string()));
    }
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(StoreError::InvalidRequest(format!(
            "Invalid blob name '{}': '.' and '..' segments are not allowed",
            name
        )));
    }
    Ok(())
}

/// Percent-encodes each `/`-separated segment; the slashes become virtual directories.
pub fn encode_blob_name(name: &str) -> String {
    name.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn ensure_container(&self) -> Result<Provisioned, StoreError> {
        let url = format!("{}/{}?restype=container", self.endpoint, self.container);
        let response = self
            .request(reqwest::Method::PUT, url)
            .await?
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        match check_response(response).await {
            Ok(_) => Ok(Provisioned::Created),
            Err(e) if e.is_conflict() => Ok(Provisioned::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    async fn upload_blob(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        validate_blob_name(name)?;

        let response = self
            .request(reqwest::Method::PUT, self.blob_url(name))
            .await?
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        check_response(response).await?;
        Ok(())
    }
}
