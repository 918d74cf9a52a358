use super::client_credentials::lenient_i64;
use super::{AccessToken, CredentialError, TokenCredential};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const IMDS_HOST: &str = "http://169.254.169.254";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// IMDS is a link-local address; off Azure the connection just hangs
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(deserialize_with = "lenient_i64")]
    expires_on: i64,
}

#[derive(Debug, Clone)]
enum Endpoint {
    /// App Service / Functions / Container Apps
    AppService { url: String, secret: String },
    /// VM / VMSS / AKS node instance metadata service
    Imds { host: String },
}

/// System- or user-assigned managed identity of the hosting resource
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: Endpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(http: reqwest::Client, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match (lookup("IDENTITY_ENDPOINT"), lookup("IDENTITY_HEADER")) {
            (Some(url), Some(secret)) if !url.is_empty() && !secret.is_empty() => {
                Endpoint::AppService { url, secret }
            }
            _ => Endpoint::Imds {
                host: lookup("AZURE_POD_IDENTITY_AUTHORITY_HOST")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| IMDS_HOST.to_string()),
            },
        };

        Self {
            http,
            endpoint,
            client_id: lookup("AZURE_CLIENT_ID").filter(|v| !v.is_empty()),
        }
    }

    fn request(&self, resource: &str) -> Result<reqwest::RequestBuilder, CredentialError> {
        let (base, api_version) = match &self.endpoint {
            Endpoint::AppService { url, .. } => (url.clone(), APP_SERVICE_API_VERSION),
            Endpoint::Imds { host } => (
                format!("{}/metadata/identity/oauth2/token", host.trim_end_matches('/')),
                IMDS_API_VERSION,
            ),
        };

        let mut url = url::Url::parse(&base)
            .map_err(|e| CredentialError::InvalidResponse(format!("bad endpoint {base}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }

        let builder = self.http.get(url);
        Ok(match &self.endpoint {
            Endpoint::AppService { secret, .. } => builder.header("X-IDENTITY-HEADER", secret),
            Endpoint::Imds { .. } => builder.header("Metadata", "true").timeout(IMDS_TIMEOUT),
        })
    }
}

/// Managed identity endpoints take a resource URI rather than a scope
pub fn resource_for_scope(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let response = self.request(resource_for_scope(scope))?.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Response {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ManagedIdentityToken = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let expires_at = DateTime::from_timestamp(parsed.expires_on, 0).ok_or_else(|| {
            CredentialError::InvalidResponse(format!("expires_on out of range: {}", parsed.expires_on))
        })?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at,
        })
    }
}
