use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are treated as expired this many seconds before the provider says so.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_in_secs: i64,
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn issue_token(&self) -> Result<IssuedToken>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Access token with refresh-if-needed; concurrent callers share one refresh.
pub struct TokenCache<S> {
    source: S,
    refresh_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_refresh_margin(source, Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS))
    }

    pub fn with_refresh_margin(source: S, refresh_margin: Duration) -> Self {
        Self {
            source,
            refresh_margin,
            cached: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let issued = self.source.issue_token().await?;
        let expires_at = now + Duration::seconds(issued.expires_in_secs) - self.refresh_margin;
        debug!(expires_at = %expires_at, "meetings: access token refreshed");

        *cached = Some(CachedToken {
            value: issued.value.clone(),
            expires_at,
        });
        Ok(issued.value)
    }

    /// Drops the cached token, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        expires_in_secs: i64,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn issue_token(&self) -> Result<IssuedToken> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                value: format!("token-{call}"),
                expires_in_secs: self.expires_in_secs,
            })
        }
    }

    fn cache(expires_in_secs: i64) -> (TokenCache<CountingSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
            expires_in_secs,
        };
        (TokenCache::new(source), calls)
    }

    #[tokio::test]
    async fn reuses_token_until_it_nears_expiry() {
        let (cache, calls) = cache(3600);

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_refresh_margin_is_fetched_again() {
        let (cache, calls) = cache(DEFAULT_REFRESH_MARGIN_SECS);

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let (cache, calls) = cache(3600);

        cache.get_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
