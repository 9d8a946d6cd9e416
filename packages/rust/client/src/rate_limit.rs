//! Fixed-window request limiter.
//!
//! At most `max_requests` calls are admitted per window. A caller that finds
//! the window exhausted sleeps until it resets. The check-and-increment runs
//! under one async mutex, and the lock is held while waiting, so concurrent
//! callers queue up behind the sleeper instead of racing the counter.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use pagesmith_shared::RateLimitConfig;

#[derive(Debug)]
struct WindowState {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter shared by every request a client makes.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(WindowState {
                count: 0,
                reset_at: Instant::now() + window,
            }),
        }
    }

    /// Wait until a request slot is available in the current window, then take it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if now > state.reset_at {
            state.count = 0;
            state.reset_at = now + self.window;
        }

        if state.count >= self.max_requests {
            let wait = state.reset_at.saturating_duration_since(now);
            debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                "rate limit reached, waiting for window reset"
            );
            tokio::time::sleep_until(state.reset_at).await;
            state.count = 0;
            state.reset_at = Instant::now() + self.window;
        }

        state.count += 1;
    }
}

impl From<&RateLimitConfig> for RateLimiter {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn requests_within_budget_are_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn request_over_budget_waits_for_reset() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(11)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_the_window() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(60)));
        let start = Instant::now();

        let handles: Vec<_> = (0..7)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 3 + 3 + 1: two full waits.
        assert!(start.elapsed() >= Duration::from_secs(120));
        assert!(start.elapsed() < Duration::from_secs(121));
    }
}
