use crate::auth::client::AccessTokenProvider;
use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Run a token-dependent call, forcing a token refresh before each retry.
///
/// The first attempt uses the cached token. Up to `max_retries` further
/// attempts follow, each after `delay`.
pub async fn with_token_retry<T, F, Fut>(
    provider: &dyn AccessTokenProvider,
    max_retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let result = match provider.get_token(attempt > 0).await {
            Some(token) => op(token).await,
            None => Err(AppError::Auth("No access token available".to_string())),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, "Call failed, retrying with fresh token: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::client::mocks::MockGrant;
    use crate::auth::client::OAuthClient;
    use crate::auth::store::{MemoryTokenStore, TokenCache};
    use crate::clock::mock::MockClock;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider() -> (OAuthClient<MockGrant>, Arc<AtomicUsize>) {
        let grant = MockGrant::new();
        let calls = grant.calls.clone();
        let cache = TokenCache::new(Arc::new(MemoryTokenStore::new()), MockClock::fixed());
        (OAuthClient::new(grant, cache), calls)
    }

    #[tokio::test]
    async fn test_retries_with_refreshed_token() {
        let (client, token_calls) = provider();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let result = with_token_retry(&client, 3, Duration::ZERO, |token| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(token.clone());
                match token.as_str() {
                    "token-3" => Ok("quotes"),
                    _ => Err(AppError::Other(anyhow::anyhow!("401 from API"))),
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "quotes");
        assert_eq!(*seen.lock().unwrap(), vec!["token-1", "token-2", "token-3"]);
        assert_eq!(token_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (client, _) = provider();
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = with_token_retry(&client, 3, Duration::ZERO, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Other(anyhow::anyhow!("still failing"))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
