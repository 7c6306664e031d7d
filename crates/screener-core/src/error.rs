use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScreenerError {
    /// Timeouts, connection resets and 5xx responses. Retried with backoff.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Unknown symbol, bad request, rejected key. Never retried.
    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Cancelled before fetch")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScreenerError {
    /// Only transient failures and rate-limit signals are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScreenerError::Transient(_) | ScreenerError::RateLimited(_))
    }

    /// Short label used to bucket failures in the end-of-run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenerError::Transient(_) => "transient",
            ScreenerError::Permanent(_) => "permanent",
            ScreenerError::RateLimited(_) => "rate_limited",
            ScreenerError::Timeout(_) => "timeout",
            ScreenerError::Cancelled => "cancelled",
            ScreenerError::Cache(_) => "cache",
            ScreenerError::InsufficientData(_) => "insufficient_data",
            ScreenerError::InvalidData(_) => "invalid_data",
            ScreenerError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for ScreenerError {
    fn from(e: serde_json::Error) -> Self {
        ScreenerError::InvalidData(e.to_string())
    }
}
