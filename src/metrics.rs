//! Lock-free runtime metrics: plain atomic counters plus a point-in-time
//! snapshot for external telemetry exporters.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::types::ConnectionState;

fn connection_state_code(state: ConnectionState) -> u32 {
    match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
        ConnectionState::Reconnecting => 3,
    }
}

fn connection_state_from_code(code: u32) -> ConnectionState {
    match code {
        1 => ConnectionState::Connecting,
        2 => ConnectionState::Connected,
        3 => ConnectionState::Reconnecting,
        _ => ConnectionState::Disconnected,
    }
}

/// A consistent-enough (not transactionally atomic across fields) read of
/// [`Metrics`] at one instant, suitable for a scrape endpoint or log line.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_dropped: u64,
    pub queue_depth: u64,
    pub connection_state: ConnectionState,
    pub latency_max_us: u64,
    pub reconnect_attempts: u64,
    pub checksum_failures: u64,
    pub gaps_detected: u64,
    pub alerts_triggered: u64,
    pub heartbeats_received: u64,
    pub uptime_secs: f64,
    pub messages_per_second: f64,
    pub last_heartbeat_age_secs: Option<f64>,
}

/// All fields are independently atomic; readers get an eventually-consistent
/// view, which matches the original's semantics (no snapshot mutex).
pub struct Metrics {
    messages_received: AtomicU64,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
    queue_depth: AtomicU64,
    connection_state: AtomicU32,
    latency_max_us: AtomicU64,
    reconnect_attempts: AtomicU64,
    checksum_failures: AtomicU64,
    gaps_detected: AtomicU64,
    alerts_triggered: AtomicU64,
    heartbeats_received: AtomicU64,
    last_heartbeat_at_ms: AtomicU64,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            connection_state: AtomicU32::new(connection_state_code(ConnectionState::Disconnected)),
            latency_max_us: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            gaps_detected: AtomicU64::new(0),
            alerts_triggered: AtomicU64::new(0),
            heartbeats_received: AtomicU64::new(0),
            last_heartbeat_at_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state
            .store(connection_state_code(state), Ordering::Relaxed);
    }

    pub fn connection_state(&self) -> ConnectionState {
        connection_state_from_code(self.connection_state.load(Ordering::Relaxed))
    }

    /// Compare-exchange loop: only advances the high-water mark, never
    /// regresses it.
    pub fn record_latency_us(&self, latency_us: u64) {
        let mut current = self.latency_max_us.load(Ordering::Relaxed);
        while latency_us > current {
            match self.latency_max_us.compare_exchange_weak(
                current,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checksum_failure(&self) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap_detected(&self) {
        self.gaps_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_triggered(&self) {
        self.alerts_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_heartbeat_at_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// `HH:MM:SS` formatted uptime.
    pub fn uptime_string(&self) -> String {
        let secs = self.uptime().as_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// 0.0 if fewer than 1ms have elapsed, to avoid a division blowup right
    /// after construction.
    pub fn messages_per_second(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.messages_processed.load(Ordering::Relaxed) as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_heartbeat_ms = self.last_heartbeat_at_ms.load(Ordering::Relaxed);
        let last_heartbeat_age_secs = if last_heartbeat_ms == 0 {
            None
        } else {
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            Some((now_ms.saturating_sub(last_heartbeat_ms)) as f64 / 1000.0)
        };

        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            connection_state: self.connection_state(),
            latency_max_us: self.latency_max_us.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            alerts_triggered: self.alerts_triggered.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            uptime_secs: self.uptime().as_secs_f64(),
            messages_per_second: self.messages_per_second(),
            last_heartbeat_age_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 0);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert!(snapshot.last_heartbeat_age_secs.is_none());
    }

    #[test]
    fn latency_high_water_mark_never_regresses() {
        let metrics = Metrics::new();
        metrics.record_latency_us(500);
        metrics.record_latency_us(100);
        assert_eq!(metrics.snapshot().latency_max_us, 500);
        metrics.record_latency_us(1000);
        assert_eq!(metrics.snapshot().latency_max_us, 1000);
    }

    #[test]
    fn heartbeat_sets_recent_age() {
        let metrics = Metrics::new();
        metrics.record_heartbeat();
        let age = metrics.snapshot().last_heartbeat_age_secs.unwrap();
        assert!(age < 1.0);
    }

    #[test]
    fn connection_state_round_trips() {
        let metrics = Metrics::new();
        metrics.set_connection_state(ConnectionState::Connected);
        assert_eq!(metrics.connection_state(), ConnectionState::Connected);
    }
}
