//! Token-bucket rate limiter for outbound subscribe/unsubscribe traffic.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimiterConfig;

/// Point-in-time counters, read without blocking the bucket's mutex.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub rate_limited: u64,
    pub current_tokens: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Classic token bucket: refills continuously at `refill_rate` tokens/sec,
/// caps at `max_tokens`, `acquire` withdraws one token.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    refill_rate: f64,
    max_tokens: f64,
    enabled: AtomicBool,
    total_requests: AtomicU64,
    allowed_requests: AtomicU64,
    rate_limited: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.burst_size as f64,
                last_refill: Instant::now(),
            }),
            refill_rate: config.requests_per_sec,
            max_tokens: config.burst_size as f64,
            enabled: AtomicBool::new(config.enabled),
            total_requests: AtomicU64::new(0),
            allowed_requests: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    fn refill_locked(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;
    }

    /// Non-blocking: returns `true` if a token was available and withdrawn.
    pub fn acquire(&self) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return true;
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut bucket = self.bucket.lock();
        self.refill_locked(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.allowed_requests.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Blocks until a token is available or `timeout` elapses. `Duration::ZERO`
    /// means wait indefinitely.
    pub fn acquire_blocking(&self, timeout: Duration) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return true;
        }

        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };

        loop {
            if self.acquire() {
                return true;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return false;
                }
            }

            let wait = self.wait_time();
            std::thread::sleep(wait.min(Duration::from_millis(100)));
        }
    }

    /// Estimated time until the next token is available.
    pub fn wait_time(&self) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::from_secs(1);
        }
        let mut bucket = self.bucket.lock();
        self.refill_locked(&mut bucket);
        if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
        }
    }

    pub fn tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill_locked(&mut bucket);
        bucket.tokens
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        let mut bucket = self.bucket.lock();
        bucket.tokens = self.max_tokens;
        bucket.last_refill = Instant::now();
        self.total_requests.store(0, Ordering::Relaxed);
        self.allowed_requests.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            allowed_requests: self.allowed_requests.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            current_tokens: self.tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_limited() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_sec: 1.0,
            burst_size: 2,
            enabled: true,
        });
        assert!(limiter.acquire());
        assert!(limiter.acquire());
        assert!(!limiter.acquire());
        let stats = limiter.stats();
        assert_eq!(stats.allowed_requests, 2);
        assert_eq!(stats.rate_limited, 1);
    }

    #[test]
    fn disabled_always_allows() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_sec: 0.0,
            burst_size: 0,
            enabled: false,
        });
        for _ in 0..5 {
            assert!(limiter.acquire());
        }
    }

    #[test]
    fn reset_restores_full_bucket() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_sec: 1.0,
            burst_size: 1,
            enabled: true,
        });
        assert!(limiter.acquire());
        assert!(!limiter.acquire());
        limiter.reset();
        assert!(limiter.acquire());
    }
}
