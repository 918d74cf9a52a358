use super::{AccessToken, CredentialError, TokenCredential};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local time, e.g. "2024-01-01 12:00:00.000000"
    expires_on: Option<String>,
    /// Unix timestamp, only emitted by newer CLI versions
    #[serde(rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

/// Token from a developer's `az login` session
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
        }
    }

    /// Use a different executable (tests, or `az.cmd` on Windows)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let parsed: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

    let expires_at = match (parsed.expires_on_epoch, parsed.expires_on.as_deref()) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| naive.and_local_timezone(Local).single())
            .map(|dt| dt.with_timezone(&Utc)),
        (None, None) => None,
    }
    .ok_or_else(|| CredentialError::InvalidResponse("missing or invalid expiry".to_string()))?;

    Ok(AccessToken {
        token: parsed.access_token,
        expires_at,
    })
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--scope", scope])
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CredentialError::NotConfigured("AzureCliCredential"),
                _ => CredentialError::Process(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::Process(stderr.trim().to_string()));
        }

        parse_cli_output(&output.stdout)
    }
}
