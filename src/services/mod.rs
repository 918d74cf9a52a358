pub mod blob_store;
pub mod identity;
pub mod item_service;
pub mod item_store;

use crate::services::identity::CredentialError;
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 409 from a create call
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Outcome of an idempotent create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// `x-ms-date` value, RFC 1123 in GMT
pub(crate) fn ms_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Turns a non-2xx response into [`StoreError::Remote`]
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        status: status.as_u16(),
        body,
    })
}
