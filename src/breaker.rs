//! Circuit breaker guarding reconnect attempts against a persistently failing
//! endpoint.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    pub failure_window: Duration,
    pub min_open_time: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
            min_open_time: Duration::from_secs(10),
        }
    }
}

struct Timestamps {
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    window_start: Option<Instant>,
}

/// Closed -> (failures within window exceed threshold) -> Open
/// Open -> (min_open_time elapsed) -> HalfOpen
/// HalfOpen -> (successes reach threshold) -> Closed
/// HalfOpen -> (any failure) -> Open
pub struct CircuitBreaker {
    config: Mutex<CircuitBreakerConfig>,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    timestamps: Mutex<Timestamps>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Mutex::new(config),
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            timestamps: Mutex::new(Timestamps {
                last_failure: None,
                opened_at: None,
                window_start: None,
            }),
        }
    }

    /// Never blocks. `Open` transitions to `HalfOpen` as a side effect once
    /// `min_open_time` has elapsed, mirroring a lazy timer check.
    pub fn can_attempt(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let config = *self.config.lock();
                let ts = self.timestamps.lock();
                let elapsed_since_open = ts
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                drop(ts);
                if elapsed_since_open >= config.min_open_time {
                    self.transition_to(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let config = *self.config.lock();
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= config.success_threshold {
                    self.reset();
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let config = *self.config.lock();
        let now = Instant::now();

        match self.state() {
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open);
                self.failure_count.store(1, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                let mut ts = self.timestamps.lock();
                ts.last_failure = Some(now);
                ts.opened_at = Some(now);
            }
            CircuitState::Closed => {
                let mut ts = self.timestamps.lock();
                let window_start = ts.window_start.get_or_insert(now);
                if now.duration_since(*window_start) > config.failure_window {
                    *window_start = now;
                    self.failure_count.store(0, Ordering::SeqCst);
                }
                ts.last_failure = Some(now);
                drop(ts);

                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                    self.timestamps.lock().opened_at = Some(now);
                }
            }
            CircuitState::Open => {
                self.timestamps.lock().last_failure = Some(now);
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition_to(&self, state: CircuitState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u32 {
        self.success_count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.transition_to(CircuitState::Closed);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        let mut ts = self.timestamps.lock();
        ts.last_failure = None;
        ts.opened_at = None;
        ts.window_start = None;
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        *self.config.lock()
    }

    pub fn set_config(&self, config: CircuitBreakerConfig) {
        *self.config.lock() = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_millis(10),
            failure_window: Duration::from_secs(60),
            min_open_time: Duration::from_millis(10),
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(test_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_attempt());
    }

    #[test]
    fn half_opens_after_min_open_time_then_closes_on_successes() {
        let breaker = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_attempt());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_attempt());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
