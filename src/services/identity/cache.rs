use super::{AccessToken, CredentialError, TokenCredential};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Tokens are refreshed once they are this close to expiry
const REFRESH_MARGIN_SECS: i64 = 300;

/// Per-scope token cache in front of another credential
pub struct CachedCredential {
    inner: Arc<dyn TokenCredential>,
    tokens: DashMap<String, AccessToken>,
}

impl CachedCredential {
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            tokens: DashMap::new(),
        }
    }

    fn cached(&self, scope: &str) -> Option<AccessToken> {
        let entry = self.tokens.get(scope)?;
        if entry.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
            Some(entry.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl TokenCredential for CachedCredential {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cached(scope) {
            return Ok(token);
        }

        let token = self.inner.get_token(scope).await?;
        self.tokens.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}
