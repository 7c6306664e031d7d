use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use screener_core::{CancelHandle, ClientConfig, ScreenerError, StatementKind, StatementProvider, StatementRequest};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::{RateLimiter, RetryPolicy};

/// Financial statements provider client.
///
/// Every request goes through one shared sliding-window limiter and a bounded
/// retry loop; only transient failures and 429s are retried.
#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    request_counts: Arc<DashMap<&'static str, u64>>,
}

impl FmpClient {
    pub fn new(config: &ClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
            retry: RetryPolicy::from_config(config),
            request_counts: Arc::new(DashMap::new()),
        }
    }

    /// Stop retrying (and starting) requests once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.retry = self.retry.with_cancel(cancel);
        self
    }

    fn url(&self, request: &StatementRequest) -> String {
        format!("{}/{}/{}", self.base_url, request.kind.endpoint(), request.ticker)
    }

    /// HTTP requests issued so far, by endpoint.
    pub fn requests_by_endpoint(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .request_counts
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect();
        counts.sort();
        counts
    }

    async fn fetch_once(&self, request: &StatementRequest) -> Result<Vec<Value>, ScreenerError> {
        self.rate_limiter.acquire().await;
        *self.request_counts.entry(request.kind.endpoint()).or_insert(0) += 1;

        let mut query = request.params();
        query.push(("apikey".to_string(), self.api_key.clone()));

        let response = self
            .client
            .get(self.url(request))
            .query(&query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_transport_error)?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body));
        }

        parse_body(request, &body)
    }
}

#[async_trait]
impl StatementProvider for FmpClient {
    async fn fetch(&self, request: &StatementRequest) -> Result<Vec<Value>, ScreenerError> {
        let label = format!("{} {}", request.kind.endpoint(), request.ticker);
        self.retry.run(&label, || self.fetch_once(request)).await
    }
}

fn map_transport_error(e: reqwest::Error) -> ScreenerError {
    if e.is_builder() {
        ScreenerError::Permanent(e.to_string())
    } else if e.is_decode() {
        ScreenerError::InvalidData(e.to_string())
    } else {
        // timeouts, refused connections, resets
        ScreenerError::Transient(e.to_string())
    }
}

/// Map a non-2xx response onto the error taxonomy.
pub(crate) fn classify_status(status: u16, body: &str) -> ScreenerError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        429 => ScreenerError::RateLimited(format!("HTTP 429: {}", snippet)),
        408 | 500..=599 => ScreenerError::Transient(format!("HTTP {}: {}", status, snippet)),
        _ => ScreenerError::Permanent(format!("HTTP {}: {}", status, snippet)),
    }
}

/// Decode a successful body into ordered period records.
pub(crate) fn parse_body(request: &StatementRequest, body: &str) -> Result<Vec<Value>, ScreenerError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ScreenerError::Permanent(format!("undecodable response: {}", e)))?;

    if let Some(msg) = value.get("Error Message").and_then(|m| m.as_str()) {
        return Err(ScreenerError::Permanent(msg.to_string()));
    }

    let records = match (request.kind, value) {
        (StatementKind::PriceHistory, Value::Object(mut obj)) => match obj.remove("historical") {
            Some(Value::Array(rows)) => rows,
            _ => vec![],
        },
        (_, Value::Array(rows)) => rows,
        (_, Value::Object(obj)) if obj.is_empty() => vec![],
        (_, other) => {
            return Err(ScreenerError::Permanent(format!(
                "unexpected response shape for {}: {}",
                request.kind.endpoint(),
                other
            )))
        }
    };

    // An empty profile means the provider does not know the symbol
    if request.kind == StatementKind::Profile && records.is_empty() {
        return Err(ScreenerError::Permanent(format!("unknown symbol {}", request.ticker)));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> FmpClient {
        let config = ClientConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            rate_limit_per_minute: 1000,
            request_timeout_secs: 5,
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        FmpClient::new(&config)
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, ""), ScreenerError::RateLimited(_)));
        assert!(matches!(classify_status(503, "down"), ScreenerError::Transient(_)));
        assert!(matches!(classify_status(404, ""), ScreenerError::Permanent(_)));
        assert!(matches!(classify_status(401, ""), ScreenerError::Permanent(_)));
    }

    #[test]
    fn test_parse_error_message_is_permanent() {
        let req = StatementRequest::quarterly("ZZZZ", StatementKind::IncomeStatement, 12);
        let err = parse_body(&req, r#"{"Error Message": "Invalid API KEY."}"#).unwrap_err();
        assert_eq!(err, ScreenerError::Permanent("Invalid API KEY.".to_string()));
    }

    #[test]
    fn test_parse_unwraps_price_history() {
        let req = StatementRequest::prices("AAPL", 300);
        let body = json!({"symbol": "AAPL", "historical": [{"date": "2024-01-02", "close": 1.0}]}).to_string();
        assert_eq!(parse_body(&req, &body).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_profile_is_unknown_symbol() {
        let req = StatementRequest::profile("NOPE");
        assert!(matches!(parse_body(&req, "[]"), Err(ScreenerError::Permanent(_))));
        let statements = StatementRequest::quarterly("NOPE", StatementKind::BalanceSheet, 4);
        assert_eq!(parse_body(&statements, "[]").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_fetch_sends_period_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/income-statement/AAPL"))
            .and(query_param("period", "quarter"))
            .and(query_param("limit", "12"))
            .and(query_param("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"revenue": 1.0}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let req = StatementRequest::quarterly("aapl", StatementKind::IncomeStatement, 12);
        let rows = client.fetch(&req).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(client.requests_by_endpoint(), vec![("income-statement".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile/MSFT"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/profile/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"symbol": "MSFT"}])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows = client.fetch(&StatementRequest::profile("MSFT")).await.unwrap();
        assert_eq!(rows[0]["symbol"], "MSFT");
        assert_eq!(client.requests_by_endpoint(), vec![("profile".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile/BAD"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.fetch(&StatementRequest::profile("BAD")).await.unwrap_err();
        assert!(matches!(err, ScreenerError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_cancelled_client_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile/MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"symbol": "MSFT"}])))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancelHandle::default();
        let client = test_client(&server.uri()).with_cancel(cancel.clone());
        cancel.cancel();
        let err = client.fetch(&StatementRequest::profile("MSFT")).await.unwrap_err();
        assert_eq!(err, ScreenerError::Cancelled);
        assert!(client.requests_by_endpoint().is_empty());
    }
}
