//! Reconnect backoff strategies.
//!
//! `delay_n = clamp(initial * multiplier^n, 0, max) * (1 + U[-jitter, +jitter])`

use std::time::Duration;

use rand::Rng;

/// A polymorphic "next delay" source. Implementations must be cloneable so
/// the runtime can hand an independent instance to a retry loop without
/// sharing attempt-count state across connections.
pub trait BackoffPolicy: Send {
    /// Compute the next delay and advance the internal attempt counter.
    fn next_delay(&mut self) -> Duration;

    /// Reset the attempt counter. Call after each successful connection.
    fn reset(&mut self);

    /// True once `max_attempts` (if any) has been reached.
    fn should_stop(&self) -> bool;

    /// 1-based attempt number of the next call to `next_delay`.
    fn current_attempt(&self) -> u32;

    fn max_attempts(&self) -> u32;

    fn clone_box(&self) -> Box<dyn BackoffPolicy>;
}

impl Clone for Box<dyn BackoffPolicy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Constant delay between retries.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl FixedBackoff {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            attempt: 0,
        }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        self.delay
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn should_stop(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }

    fn current_attempt(&self) -> u32 {
        self.attempt + 1
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn clone_box(&self) -> Box<dyn BackoffPolicy> {
        Box::new(self.clone())
    }
}

/// No delay between retries.
#[derive(Debug, Clone)]
pub struct NoBackoff {
    max_attempts: u32,
    attempt: u32,
}

impl NoBackoff {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempt: 0,
        }
    }
}

impl BackoffPolicy for NoBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        Duration::ZERO
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn should_stop(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }

    fn current_attempt(&self) -> u32 {
        self.attempt + 1
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn clone_box(&self) -> Box<dyn BackoffPolicy> {
        Box::new(self.clone())
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    max_attempts: u32,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Fast retries for dev/testing: 100ms -> 5s, x1.5, 10% jitter, 20 attempts.
    pub fn aggressive() -> Self {
        Self::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(5))
            .multiplier(1.5)
            .jitter(0.1)
            .max_attempts(20)
            .build()
    }

    /// Production-friendly: 1s -> 2min, x2, 30% jitter, 10 attempts.
    pub fn conservative() -> Self {
        Self::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(120))
            .multiplier(2.0)
            .jitter(0.3)
            .max_attempts(10)
            .build()
    }

    /// Never gives up: 1s -> 5min, x2, 30% jitter, unbounded attempts.
    pub fn infinite() -> Self {
        Self::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(300))
            .multiplier(2.0)
            .jitter(0.3)
            .max_attempts(0)
            .build()
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
    max_attempts: i32,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.3,
            max_attempts: 10,
        }
    }
}

impl ExponentialBackoffBuilder {
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Clamped to `[0.0, 1.0]`.
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// 0 = infinite.
    pub fn max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
            max_attempts: self.max_attempts.max(0) as u32,
            attempt: 0,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        if self.should_stop() {
            return self.max_delay;
        }

        let base_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(self.attempt as i32);
        let base_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let jittered_ms = if self.jitter_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
            base_ms * (1.0 + jitter)
        } else {
            base_ms
        };
        let jittered_ms = jittered_ms.max(0.0);

        self.attempt += 1;
        Duration::from_millis(jittered_ms as u64)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn should_stop(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }

    fn current_attempt(&self) -> u32 {
        self.attempt + 1
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn clone_box(&self) -> Box<dyn BackoffPolicy> {
        let mut copy = self.clone();
        copy.attempt = 0;
        Box::new(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_bounds_without_jitter() {
        let mut backoff = ExponentialBackoff::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .multiplier(2.0)
            .jitter(0.0)
            .max_attempts(10)
            .build();

        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_delay().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn should_stop_fires_on_the_n_plus_one_call() {
        let mut backoff = FixedBackoff::new(Duration::from_millis(1), 3);
        for _ in 0..3 {
            assert!(!backoff.should_stop());
            backoff.next_delay();
        }
        assert!(backoff.should_stop());
    }

    #[test]
    fn reset_clears_attempt_count() {
        let mut backoff = NoBackoff::new(2);
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.should_stop());
        backoff.reset();
        assert!(!backoff.should_stop());
        assert_eq!(backoff.current_attempt(), 1);
    }

    #[test]
    fn clone_box_resets_attempt_count() {
        let mut backoff = ExponentialBackoff::aggressive();
        backoff.next_delay();
        backoff.next_delay();
        let cloned = backoff.clone_box();
        assert_eq!(cloned.current_attempt(), 1);
    }
}
