use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use screener_core::{ScreenerError, StatementRequest};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS response_cache (
    key TEXT PRIMARY KEY,
    endpoint TEXT NOT NULL,
    ticker TEXT NOT NULL,
    params TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    ttl_secs INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_response_cache_endpoint ON response_cache(endpoint)";

/// Identity of a provider request. The API key is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub endpoint: String,
    pub ticker: String,
    pub params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(endpoint: &str, ticker: &str, mut params: Vec<(String, String)>) -> Self {
        params.sort();
        Self {
            endpoint: endpoint.to_string(),
            ticker: ticker.trim().to_uppercase(),
            params,
        }
    }

    pub fn from_request(request: &StatementRequest) -> Self {
        Self::new(request.kind.endpoint(), &request.ticker, request.params())
    }

    fn params_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// SHA-256 hex digest of `endpoint:TICKER:k=v|k=v`.
    pub fn signature(&self) -> String {
        let raw = format!("{}:{}:{}", self.endpoint, self.ticker, self.params_string());
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Durable TTL cache of provider responses backed by SQLite.
///
/// Concurrent misses on one key are serialized through a per-key mutex, so
/// at most one fetch per key is live at a time.
#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

enum Lookup {
    Fresh(Value),
    Stale,
    Missing,
    Unreadable(String),
}

impl ResponseCache {
    pub async fn new(database_url: &str) -> Result<Self, ScreenerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(cache_err)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(cache_err)?;

        Self::with_pool(pool).await
    }

    /// Single-connection in-memory cache; the database lives as long as the pool.
    pub async fn in_memory() -> Result<Self, ScreenerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(cache_err)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, ScreenerError> {
        let cache = Self {
            pool,
            locks: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        };
        cache.init_schema().await?;
        Ok(cache)
    }

    async fn init_schema(&self) -> Result<(), ScreenerError> {
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(cache_err)?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn lookup(&self, signature: &str) -> Lookup {
        let row = sqlx::query("SELECT payload, fetched_at, ttl_secs FROM response_cache WHERE key = ?")
            .bind(signature)
            .fetch_optional(&self.pool)
            .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return Lookup::Missing,
            Err(e) => return Lookup::Unreadable(e.to_string()),
        };

        let fetched_at: i64 = match row.try_get("fetched_at") {
            Ok(v) => v,
            Err(e) => return Lookup::Unreadable(e.to_string()),
        };
        let ttl_secs: i64 = match row.try_get("ttl_secs") {
            Ok(v) => v,
            Err(e) => return Lookup::Unreadable(e.to_string()),
        };
        if Utc::now().timestamp() - fetched_at >= ttl_secs {
            return Lookup::Stale;
        }

        let payload: String = match row.try_get("payload") {
            Ok(v) => v,
            Err(e) => return Lookup::Unreadable(e.to_string()),
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Lookup::Fresh(value),
            Err(e) => Lookup::Unreadable(e.to_string()),
        }
    }

    /// Fresh cached value, if any. Unreadable entries count as absent.
    async fn read_fresh(&self, key: &CacheKey, signature: &str) -> Option<Value> {
        match self.lookup(signature).await {
            Lookup::Fresh(value) => Some(value),
            Lookup::Stale | Lookup::Missing => None,
            Lookup::Unreadable(reason) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Cache entry for {} {} unreadable ({}), fetching directly",
                    key.endpoint,
                    key.ticker,
                    reason
                );
                None
            }
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.read_fresh(key, &key.signature()).await
    }

    /// Store `value` in one statement, replacing any previous entry for the key.
    pub async fn put(&self, key: &CacheKey, value: &Value, ttl: Duration) -> Result<(), ScreenerError> {
        let payload = serde_json::to_string(value).map_err(|e| ScreenerError::Cache(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO response_cache (key, endpoint, ticker, params, payload, fetched_at, ttl_secs)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.signature())
        .bind(&key.endpoint)
        .bind(&key.ticker)
        .bind(key.params_string())
        .bind(payload)
        .bind(Utc::now().timestamp())
        .bind(ttl.as_secs() as i64)
        .execute(&self.pool)
        .await
        .map_err(cache_err)?;
        Ok(())
    }

    /// Return the cached value for `key`, or run `fetch` and store its result.
    ///
    /// The entry is written only after `fetch` completes successfully, so a
    /// cancelled or failed fetch leaves the previous state untouched. Storage
    /// failures are logged and never fail the call.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> Result<Value, ScreenerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ScreenerError>>,
    {
        let signature = key.signature();

        if let Some(value) = self.read_fresh(key, &signature).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache hit: {} {}", key.endpoint, key.ticker);
            return Ok(value);
        }

        let lock = self
            .locks
            .entry(signature.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Someone else may have filled the entry while we waited
        if let Some(value) = self.read_fresh(key, &signature).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Cache miss: {} {}", key.endpoint, key.ticker);
        let value = fetch().await?;

        if let Err(e) = self.put(key, &value, ttl).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Failed to store cache entry for {} {}: {}", key.endpoint, key.ticker, e);
        }

        Ok(value)
    }

    /// Delete every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, ScreenerError> {
        let result = sqlx::query("DELETE FROM response_cache WHERE ? - fetched_at >= ttl_secs")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(cache_err)?;
        Ok(result.rows_affected())
    }

    pub async fn clear_endpoint(&self, endpoint: &str) -> Result<u64, ScreenerError> {
        let result = sqlx::query("DELETE FROM response_cache WHERE endpoint = ?")
            .bind(endpoint)
            .execute(&self.pool)
            .await
            .map_err(cache_err)?;
        Ok(result.rows_affected())
    }

    pub async fn len(&self) -> Result<i64, ScreenerError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM response_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(cache_err)?;
        row.try_get("n").map_err(cache_err)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

fn cache_err(e: sqlx::Error) -> ScreenerError {
    ScreenerError::Cache(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn key(ticker: &str) -> CacheKey {
        CacheKey::new(
            "income-statement",
            ticker,
            vec![("period".into(), "quarter".into()), ("limit".into(), "12".into())],
        )
    }

    #[test]
    fn test_signature_ignores_param_order_and_case() {
        let a = CacheKey::new("profile", "aapl", vec![("b".into(), "2".into()), ("a".into(), "1".into())]);
        let b = CacheKey::new("profile", "AAPL", vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().len(), 64);
        assert_ne!(a.signature(), key("AAPL").signature());
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let cache = ResponseCache::in_memory().await.unwrap();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_fetch(&key("AAPL"), Duration::from_secs(3600), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!([{"revenue": 1.0}]))
                })
                .await
                .unwrap();
            assert_eq!(value, json!([{"revenue": 1.0}]));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stale_entry_refetches() {
        let cache = ResponseCache::in_memory().await.unwrap();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            cache
                .get_or_fetch(&key("MSFT"), Duration::from_secs(0), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!([]))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let cache = ResponseCache::in_memory().await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(&key("NVDA"), Duration::from_secs(3600), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(json!([{"n": 1}]))
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), json!([{"n": 1}]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupted_entry_degrades_to_fetch() {
        let cache = ResponseCache::in_memory().await.unwrap();
        let k = key("IBM");
        sqlx::query(
            "INSERT INTO response_cache (key, endpoint, ticker, params, payload, fetched_at, ttl_secs)
             VALUES (?, 'income-statement', 'IBM', '', '{not json', ?, 3600)",
        )
        .bind(k.signature())
        .bind(Utc::now().timestamp())
        .execute(cache.pool())
        .await
        .unwrap();

        let value = cache
            .get_or_fetch(&k, Duration::from_secs(3600), || async { Ok(json!([1, 2])) })
            .await
            .unwrap();
        assert_eq!(value, json!([1, 2]));
        assert!(cache.stats().errors >= 1);
        // The bad row was replaced
        assert_eq!(cache.get(&k).await, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let cache = ResponseCache::in_memory().await.unwrap();
        let result = cache
            .get_or_fetch(&key("FAIL"), Duration::from_secs(3600), || async {
                Err(ScreenerError::Transient("timeout".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_endpoint() {
        let cache = ResponseCache::in_memory().await.unwrap();
        cache.put(&key("A"), &json!([]), Duration::from_secs(60)).await.unwrap();
        let profile = CacheKey::new("profile", "A", vec![]);
        cache.put(&profile, &json!([{}]), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear_endpoint("income-statement").await.unwrap(), 1);
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("cache.db").display());

        let first = ResponseCache::new(&url).await.unwrap();
        first.put(&key("KO"), &json!([{"revenue": 9.0}]), Duration::from_secs(3600)).await.unwrap();
        first.pool().close().await;

        let reopened = ResponseCache::new(&url).await.unwrap();
        let calls = AtomicU32::new(0);
        let value = reopened
            .get_or_fetch(&key("KO"), Duration::from_secs(3600), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!([]))
            })
            .await
            .unwrap();
        assert_eq!(value, json!([{"revenue": 9.0}]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reopened.stats().hits, 1);
        assert_eq!(reopened.len().await.unwrap(), 1);
    }
}
