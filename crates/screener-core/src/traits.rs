use async_trait::async_trait;
use crate::{ScreenerError, StatementRequest};

/// Source of provider records (HTTP client, cache wrapper, test double).
///
/// Returns the ordered period records for one request, most recent first.
#[async_trait]
pub trait StatementProvider: Send + Sync {
    async fn fetch(&self, request: &StatementRequest) -> Result<Vec<serde_json::Value>, ScreenerError>;
}

#[async_trait]
impl<P: StatementProvider + ?Sized> StatementProvider for std::sync::Arc<P> {
    async fn fetch(&self, request: &StatementRequest) -> Result<Vec<serde_json::Value>, ScreenerError> {
        (**self).fetch(request).await
    }
}
