pub mod cache;
pub mod cached;
pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use cached::CachedProvider;
pub use client::FmpClient;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
