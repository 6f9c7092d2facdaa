//! Per-adapter request pacing.
//!
//! Source sites are shared government/public infrastructure, not a
//! metered API — the contract here is a single minimum-interval gate
//! per adapter instance rather than a sliding-window quota.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes an adapter's outbound requests to at least `min_interval`
/// apart. Cloning an adapter does not clone its limiter state; wrap in
/// an `Arc` if multiple call sites must share one gate.
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Sleeps, if needed, so that the next request is at least
    /// `min_interval` after the previous one, then records this
    /// request's timestamp.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    /// The 2-second floor used by the SBV adapter.
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = StdInstant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn second_call_waits_out_the_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(60));
        limiter.wait().await;
        let start = StdInstant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn call_after_interval_has_elapsed_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        limiter.wait().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let start = StdInstant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(15));
    }
}
