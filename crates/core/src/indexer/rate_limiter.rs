//! Token bucket rate limiter, one bucket per source.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

/// Token bucket for a single source.
///
/// Tokens are added at a constant rate and consumed per request. The bucket
/// starts full so a burst up to the capacity goes through immediately.
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// `requests_per_minute` must be non-zero.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or report how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    /// Change the rate; the current token count is clamped to the new capacity.
    pub fn set_rate_limit(&mut self, requests_per_minute: u32) {
        self.capacity = requests_per_minute.max(1) as f32;
        self.refill_rate = self.capacity / 60.0;
        self.tokens = self.tokens.min(self.capacity);
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Rate limiters keyed by source name. Sources without a bucket are not
/// limited.
pub struct RateLimiterPool {
    limiters: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiterPool {
    /// Build a pool from `(source name, requests per minute)` pairs. A rate
    /// of 0 means unlimited.
    pub fn new<'a>(sources: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let limiters = sources
            .into_iter()
            .filter(|(_, rpm)| *rpm > 0)
            .map(|(name, rpm)| (name.to_string(), TokenBucket::new(rpm)))
            .collect();
        Self {
            limiters: Mutex::new(limiters),
        }
    }

    pub fn empty() -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Add or update a source. A rate of 0 removes its limit.
    pub async fn set_rate_limit(&self, source: &str, requests_per_minute: u32) {
        let mut limiters = self.limiters.lock().await;
        if requests_per_minute == 0 {
            limiters.remove(source);
        } else if let Some(bucket) = limiters.get_mut(source) {
            bucket.set_rate_limit(requests_per_minute);
        } else {
            limiters.insert(source.to_string(), TokenBucket::new(requests_per_minute));
        }
    }

    /// Take a token without waiting. Returns the wait time when exhausted.
    pub async fn try_acquire(&self, source: &str) -> Result<(), Duration> {
        let mut limiters = self.limiters.lock().await;
        match limiters.get_mut(source) {
            Some(bucket) => bucket.try_acquire(),
            None => Ok(()),
        }
    }

    /// Take a token, sleeping until one is available.
    pub async fn acquire(&self, source: &str) {
        while let Err(wait) = self.try_acquire(source).await {
            debug!(source = source, wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            sleep(wait).await;
        }
    }

    pub async fn is_limited(&self, source: &str) -> bool {
        self.limiters.lock().await.contains_key(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_new() {
        let bucket = TokenBucket::new(10);
        assert_eq!(bucket.capacity, 10.0);
        assert_eq!(bucket.tokens, 10.0);
        assert!((bucket.refill_rate - 10.0 / 60.0).abs() < 0.001);
    }

    #[test]
    fn test_token_bucket_drains_then_reports_wait() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            assert!(bucket.try_acquire().is_ok());
        }

        let wait = bucket.try_acquire().unwrap_err();
        // At 10 rpm one token takes 6 seconds.
        assert!(wait.as_secs() <= 6);
        assert!(wait.as_millis() > 0);
    }

    #[test]
    fn test_token_bucket_set_rate_limit_clamps_tokens() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..5 {
            bucket.try_acquire().unwrap();
        }
        bucket.set_rate_limit(20);
        assert_eq!(bucket.capacity, 20.0);
        assert!(bucket.tokens >= 5.0 && bucket.tokens < 5.1);

        bucket.set_rate_limit(3);
        assert_eq!(bucket.tokens, 3.0);
    }

    #[tokio::test]
    async fn test_pool_unknown_and_unlimited_sources_pass() {
        let pool = RateLimiterPool::new([("limited", 1), ("free", 0)]);
        assert!(pool.is_limited("limited").await);
        assert!(!pool.is_limited("free").await);

        for _ in 0..5 {
            assert!(pool.try_acquire("free").await.is_ok());
            assert!(pool.try_acquire("unknown").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_pool_try_acquire_exhausts() {
        let pool = RateLimiterPool::new([("test", 2)]);
        assert!(pool.try_acquire("test").await.is_ok());
        assert!(pool.try_acquire("test").await.is_ok());
        assert!(pool.try_acquire("test").await.is_err());
    }

    #[tokio::test]
    async fn test_pool_acquire_waits_for_refill() {
        // 600 rpm = one token every 100ms.
        let pool = RateLimiterPool::new([("fast", 600)]);
        while pool.try_acquire("fast").await.is_ok() {}

        let start = Instant::now();
        pool.acquire("fast").await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_pool_set_rate_limit() {
        let pool = RateLimiterPool::empty();
        pool.set_rate_limit("a", 10).await;
        assert!(pool.is_limited("a").await);
        pool.set_rate_limit("a", 0).await;
        assert!(!pool.is_limited("a").await);
    }
}
