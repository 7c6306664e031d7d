use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
///
/// Clones share the same window, so one limiter covers every concurrent
/// fetcher in the run.
#[derive(Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Wait until a slot is free and claim it.
    pub async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Full window: sleep until the oldest request ages out
            let sleep_dur = match ts.front() {
                Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                None => Duration::ZERO,
            } + Duration::from_millis(10);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.2}s for provider slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }

    /// Requests counted in the current window.
    pub async fn in_flight(&self) -> usize {
        let ts = self.timestamps.lock().await;
        let now = Instant::now();
        ts.iter().filter(|t| now.duration_since(**t) < self.window).count()
    }
}
