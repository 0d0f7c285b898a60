//! Bearer token cache owned by a single provider

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::RegistryError;

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Lifetime assumed when a token endpoint does not report one
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Reported lifetimes are capped to this
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: Instant,
}

impl IssuedToken {
    pub fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl.min(MAX_TOKEN_TTL),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Tokens keyed by scope (usually the repository path).
///
/// Lookups run concurrently. Refreshes are serialized per cache, so concurrent
/// resolutions that miss at the same time issue a single token request.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cached(&self, scope: &str) -> Option<String> {
        self.tokens
            .read()
            .await
            .get(scope)
            .filter(|token| token.is_fresh())
            .map(|token| token.value.clone())
    }

    /// Return a fresh token for `scope`, calling `fetch` at most once across concurrent callers
    pub async fn get_or_refresh<F, Fut>(&self, scope: &str, fetch: F) -> Result<String, RegistryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, RegistryError>>,
    {
        if let Some(token) = self.cached(scope).await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached(scope).await {
            return Ok(token);
        }

        debug!("Refreshing token for scope {}", scope);
        let token = fetch().await?;
        let value = token.value.clone();
        self.tokens.write().await.insert(scope.to_string(), token);

        Ok(value)
    }

    /// Forget the token for `scope`, e.g. after the registry rejected it
    pub async fn invalidate(&self, scope: &str) {
        self.tokens.write().await.remove(scope);
    }
}
