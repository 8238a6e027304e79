use crate::auth::store::{CachedToken, TokenCache};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Token issued by a grant exchange, before it is cached
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    pub scope: String,
}

/// One way of obtaining a fresh bearer token from an identity provider
#[async_trait]
pub trait GrantStrategy: Send + Sync {
    /// Name of the token cache entry owned by this strategy
    fn cache_key(&self) -> &str;

    async fn request_token(&self) -> Result<TokenGrant>;
}

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a usable token, or `None` if one could not be obtained.
    async fn fetch_token(&self, force_refresh: bool) -> Option<CachedToken>;

    async fn get_token(&self, force_refresh: bool) -> Option<String> {
        self.fetch_token(force_refresh)
            .await
            .map(|token| token.access_token)
    }
}

/// Caching token provider: serves tokens from the [`TokenCache`] and only
/// runs the grant exchange on a miss, on expiry or when forced.
pub struct OAuthClient<G> {
    strategy: G,
    cache: TokenCache,
    // Serializes load -> exchange -> save so concurrent callers share one refresh
    refresh_lock: Mutex<()>,
}

impl<G: GrantStrategy> OAuthClient<G> {
    pub fn new(strategy: G, cache: TokenCache) -> Self {
        Self {
            strategy,
            cache,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn strategy(&self) -> &G {
        &self.strategy
    }

    /// Drop the cached token so the next call performs an exchange
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear(self.strategy.cache_key())
    }
}

#[async_trait]
impl<G: GrantStrategy> AccessTokenProvider for OAuthClient<G> {
    #[instrument(name = "Getting access token", skip(self), fields(client = self.strategy.cache_key()))]
    async fn fetch_token(&self, force_refresh: bool) -> Option<CachedToken> {
        let key = self.strategy.cache_key();
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            if let Some(token) = self.cache.load(key) {
                return Some(token);
            }
        }

        let grant = match self.strategy.request_token().await {
            Ok(grant) => grant,
            Err(e) => {
                error!("Failed to obtain access token: {}", e);
                return None;
            }
        };

        info!(expires_in = grant.expires_in, "Obtained new access token");

        match self
            .cache
            .save(key, &grant.access_token, grant.expires_in, &grant.scope)
        {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Failed to cache access token: {}", e);
                Some(CachedToken::new(
                    grant.access_token,
                    grant.expires_in,
                    grant.scope,
                    self.cache.clock().timestamp(),
                ))
            }
        }
    }
}
