use super::{AccessToken, CredentialError, TokenCredential};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Deserializer};
use std::env;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Token endpoints disagree on whether numbers are sent as numbers or strings.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "lenient_i64")]
    expires_in: i64,
}

/// Tenant-scoped app registration details shared by both credentials below
#[derive(Debug, Clone)]
struct AppRegistration {
    authority_host: String,
    tenant_id: String,
    client_id: String,
}

impl AppRegistration {
    fn from_lookup<F>(lookup: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Some(Self {
            authority_host: lookup("AZURE_AUTHORITY_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            tenant_id: lookup("AZURE_TENANT_ID").filter(|v| !v.is_empty())?,
            client_id: lookup("AZURE_CLIENT_ID").filter(|v| !v.is_empty())?,
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// OAuth2 client-credentials grant; `secret` holds either the client
    /// secret or the assertion pair.
    async fn request_token(
        &self,
        http: &reqwest::Client,
        scope: &str,
        secret: &[(&str, &str)],
    ) -> Result<AccessToken, CredentialError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("scope", scope),
        ];
        form.extend_from_slice(secret);

        let body = serde_urlencoded::to_string(&form)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let response = http
            .post(self.token_url())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Response {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        })
    }
}

/// Service principal configured through `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
/// and `AZURE_CLIENT_SECRET`.
pub struct EnvironmentCredential {
    http: reqwest::Client,
    registration: Option<AppRegistration>,
    client_secret: Option<String>,
}

impl EnvironmentCredential {
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(http: reqwest::Client, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            http,
            registration: AppRegistration::from_lookup(&lookup),
            client_secret: lookup("AZURE_CLIENT_SECRET").filter(|v| !v.is_empty()),
        }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "EnvironmentCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let (Some(registration), Some(secret)) = (&self.registration, &self.client_secret) else {
            return Err(CredentialError::NotConfigured(self.name()));
        };

        registration
            .request_token(&self.http, scope, &[("client_secret", secret.as_str())])
            .await
    }
}

/// Federated identity (e.g. AKS workload identity): the client assertion is
/// re-read from `AZURE_FEDERATED_TOKEN_FILE` on every request since the
/// platform rotates it.
pub struct WorkloadIdentityCredential {
    http: reqwest::Client,
    registration: Option<AppRegistration>,
    token_file: Option<String>,
}

impl WorkloadIdentityCredential {
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(http: reqwest::Client, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            http,
            registration: AppRegistration::from_lookup(&lookup),
            token_file: lookup("AZURE_FEDERATED_TOKEN_FILE").filter(|v| !v.is_empty()),
        }
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn name(&self) -> &'static str {
        "WorkloadIdentityCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let (Some(registration), Some(token_file)) = (&self.registration, &self.token_file) else {
            return Err(CredentialError::NotConfigured(self.name()));
        };

        let assertion = tokio::fs::read_to_string(token_file)
            .await
            .map_err(|e| CredentialError::Process(format!("reading {}: {}", token_file, e)))?;

        registration
            .request_token(
                &self.http,
                scope,
                &[
                    ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                    ("client_assertion", assertion.trim()),
                ],
            )
            .await
    }
}
