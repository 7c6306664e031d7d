use async_trait::async_trait;
use screener_core::{CacheConfig, ScreenerError, StatementKind, StatementProvider, StatementRequest};
use serde_json::Value;
use std::time::Duration;

use crate::{CacheKey, ResponseCache};

/// Wraps a provider with the durable response cache.
pub struct CachedProvider<P> {
    inner: P,
    cache: ResponseCache,
    config: CacheConfig,
}

impl<P: StatementProvider> CachedProvider<P> {
    pub fn new(inner: P, cache: ResponseCache, config: CacheConfig) -> Self {
        Self { inner, cache, config }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn ttl_for(&self, kind: StatementKind) -> Duration {
        let secs = match kind {
            StatementKind::Profile => self.config.profile_ttl_secs,
            StatementKind::PriceHistory => self.config.prices_ttl_secs,
            StatementKind::IncomeStatement | StatementKind::BalanceSheet | StatementKind::CashFlow => {
                self.config.statements_ttl_secs
            }
        };
        Duration::from_secs(secs)
    }
}

#[async_trait]
impl<P: StatementProvider> StatementProvider for CachedProvider<P> {
    async fn fetch(&self, request: &StatementRequest) -> Result<Vec<Value>, ScreenerError> {
        if !self.config.enabled {
            return self.inner.fetch(request).await;
        }

        let key = CacheKey::from_request(request);
        let value = self
            .cache
            .get_or_fetch(&key, self.ttl_for(request.kind), || async {
                self.inner.fetch(request).await.map(Value::Array)
            })
            .await?;

        match value {
            Value::Array(rows) => Ok(rows),
            other => {
                tracing::warn!(
                    "Cached payload for {} {} is not a record list ({}), refetching",
                    key.endpoint,
                    key.ticker,
                    other
                );
                let rows = self.inner.fetch(request).await?;
                if let Err(e) = self
                    .cache
                    .put(&key, &Value::Array(rows.clone()), self.ttl_for(request.kind))
                    .await
                {
                    tracing::warn!("Failed to repair cache entry: {}", e);
                }
                Ok(rows)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StatementProvider for CountingProvider {
        async fn fetch(&self, request: &StatementRequest) -> Result<Vec<Value>, ScreenerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.ticker == "GONE" {
                return Err(ScreenerError::Permanent("unknown symbol".into()));
            }
            Ok(vec![json!({"symbol": request.ticker})])
        }
    }

    async fn provider() -> CachedProvider<CountingProvider> {
        CachedProvider::new(
            CountingProvider { calls: AtomicU32::new(0) },
            ResponseCache::in_memory().await.unwrap(),
            CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_cache() {
        let provider = provider().await;
        let req = StatementRequest::profile("AAPL");
        provider.fetch(&req).await.unwrap();
        let rows = provider.fetch(&req).await.unwrap();

        assert_eq!(rows[0]["symbol"], "AAPL");
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let provider = provider().await;
        let req = StatementRequest::profile("GONE");
        assert!(provider.fetch(&req).await.is_err());
        assert!(provider.fetch(&req).await.is_err());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_list_payload_is_repaired() {
        let provider = provider().await;
        let req = StatementRequest::profile("MSFT");
        let key = CacheKey::from_request(&req);
        provider
            .cache()
            .put(&key, &json!({"bogus": true}), Duration::from_secs(3600))
            .await
            .unwrap();

        let rows = provider.fetch(&req).await.unwrap();
        assert_eq!(rows[0]["symbol"], "MSFT");
        assert_eq!(provider.cache().get(&key).await, Some(json!([{"symbol": "MSFT"}])));
    }

    #[tokio::test]
    async fn test_ttl_per_endpoint() {
        let provider = provider().await;
        assert_eq!(provider.ttl_for(StatementKind::Profile), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(provider.ttl_for(StatementKind::CashFlow), Duration::from_secs(24 * 3600));
    }
}
