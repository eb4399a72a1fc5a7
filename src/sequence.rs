//! Per-(channel, symbol) sequence gap detection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{GapDetectionConfig, GapRecoveryAction};

/// A detected forward gap or out-of-order sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct GapInfo {
    pub channel: String,
    pub symbol: String,
    pub expected_seq: u64,
    pub actual_seq: u64,
    pub gap_size: i64,
    pub timestamp_ms: u64,
}

impl GapInfo {
    /// A reorder is a sequence number lower than what was expected.
    pub fn is_reorder(&self) -> bool {
        self.actual_seq < self.expected_seq
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ChannelSymbolKey {
    channel: String,
    symbol: String,
}

/// Tracks the last-seen sequence number per (channel, symbol) and reports
/// gaps and reorders according to [`GapDetectionConfig`].
pub struct SequenceTracker {
    config: GapDetectionConfig,
    last_seq: HashMap<ChannelSymbolKey, u64>,
    gap_count: AtomicU64,
}

impl SequenceTracker {
    pub fn new(config: GapDetectionConfig) -> Self {
        Self {
            config,
            last_seq: HashMap::new(),
            gap_count: AtomicU64::new(0),
        }
    }

    /// Returns `Some(GapInfo)` if this sequence number represents a gap or
    /// reorder that should be reported, `None` otherwise (including when gap
    /// detection is disabled).
    pub fn check(&mut self, channel: &str, symbol: &str, sequence: u64) -> Option<GapInfo> {
        if !self.config.enabled {
            return None;
        }

        let key = ChannelSymbolKey {
            channel: channel.to_string(),
            symbol: symbol.to_string(),
        };

        let Some(&last) = self.last_seq.get(&key) else {
            self.last_seq.insert(key, sequence);
            return None;
        };

        let expected = last + 1;

        if sequence == expected {
            self.last_seq.insert(key, sequence);
            return None;
        }

        if sequence > expected {
            let gap_size = (sequence - expected) as i64;
            self.last_seq.insert(key, sequence);

            if gap_size as u64 <= self.config.gap_tolerance {
                return None;
            }

            self.gap_count.fetch_add(1, Ordering::Relaxed);
            return Some(GapInfo {
                channel: channel.to_string(),
                symbol: symbol.to_string(),
                expected_seq: expected,
                actual_seq: sequence,
                gap_size,
                timestamp_ms: now_ms(),
            });
        }

        // sequence < expected: a reorder. Does not advance last_seq.
        if self.config.track_reorders {
            self.gap_count.fetch_add(1, Ordering::Relaxed);
            Some(GapInfo {
                channel: channel.to_string(),
                symbol: symbol.to_string(),
                expected_seq: expected,
                actual_seq: sequence,
                gap_size: (expected as i64) - (sequence as i64),
                timestamp_ms: now_ms(),
            })
        } else {
            None
        }
    }

    pub fn recovery_action(&self) -> GapRecoveryAction {
        self.config.recovery
    }

    /// Clears tracking for a single (channel, symbol), e.g. after a fresh
    /// snapshot re-baselines it.
    pub fn reset(&mut self, channel: &str, symbol: &str) {
        self.last_seq.remove(&ChannelSymbolKey {
            channel: channel.to_string(),
            symbol: symbol.to_string(),
        });
    }

    /// Clears all tracked state and the cumulative gap counter.
    pub fn reset_all(&mut self) {
        self.last_seq.clear();
        self.gap_count.store(0, Ordering::Relaxed);
    }

    pub fn gap_count(&self) -> u64 {
        self.gap_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tolerance: u64, track_reorders: bool) -> GapDetectionConfig {
        GapDetectionConfig {
            enabled: true,
            gap_tolerance: tolerance,
            track_reorders,
            recovery: GapRecoveryAction::Callback,
        }
    }

    #[test]
    fn first_observation_establishes_baseline_without_reporting() {
        let mut tracker = SequenceTracker::new(config(0, true));
        assert_eq!(tracker.check("book", "BTC/USD", 100), None);
    }

    #[test]
    fn exact_match_advances_silently() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        assert_eq!(tracker.check("book", "BTC/USD", 101), None);
        assert_eq!(tracker.check("book", "BTC/USD", 102), None);
    }

    #[test]
    fn forward_gap_reports_and_advances() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        let gap = tracker.check("book", "BTC/USD", 105).unwrap();
        assert_eq!(gap.expected_seq, 101);
        assert_eq!(gap.actual_seq, 105);
        assert_eq!(gap.gap_size, 4);
        assert!(!gap.is_reorder());
        // advanced despite the gap
        assert_eq!(tracker.check("book", "BTC/USD", 106), None);
    }

    #[test]
    fn gap_within_tolerance_is_silent_but_still_advances() {
        let mut tracker = SequenceTracker::new(config(3, true));
        tracker.check("book", "BTC/USD", 100);
        assert_eq!(tracker.check("book", "BTC/USD", 103), None);
        // last_seq advanced to 103, so next expected is 104
        let gap = tracker.check("book", "BTC/USD", 110).unwrap();
        assert_eq!(gap.expected_seq, 104);
    }

    #[test]
    fn reorder_reports_without_advancing_when_tracked() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        tracker.check("book", "BTC/USD", 101);
        let gap = tracker.check("book", "BTC/USD", 99).unwrap();
        assert!(gap.is_reorder());
        // last_seq unchanged at 101, so next expected is still 102
        assert_eq!(tracker.check("book", "BTC/USD", 102), None);
    }

    #[test]
    fn reorder_silent_when_track_reorders_disabled() {
        let mut tracker = SequenceTracker::new(config(0, false));
        tracker.check("book", "BTC/USD", 100);
        tracker.check("book", "BTC/USD", 101);
        assert_eq!(tracker.check("book", "BTC/USD", 99), None);
    }

    #[test]
    fn channels_and_symbols_are_tracked_independently() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        tracker.check("ticker", "BTC/USD", 1);
        assert_eq!(tracker.check("book", "BTC/USD", 101), None);
        assert_eq!(tracker.check("ticker", "BTC/USD", 2), None);
    }

    #[test]
    fn reset_clears_only_that_key() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        tracker.check("book", "ETH/USD", 50);
        tracker.reset("book", "BTC/USD");
        assert_eq!(tracker.check("book", "BTC/USD", 500), None); // re-baselines
        assert_eq!(tracker.check("book", "ETH/USD", 51), None); // unaffected
    }

    #[test]
    fn reset_all_clears_state_and_gap_counter() {
        let mut tracker = SequenceTracker::new(config(0, true));
        tracker.check("book", "BTC/USD", 100);
        tracker.check("book", "BTC/USD", 105);
        assert_eq!(tracker.gap_count(), 1);
        tracker.reset_all();
        assert_eq!(tracker.gap_count(), 0);
        assert_eq!(tracker.check("book", "BTC/USD", 1), None);
    }

    #[test]
    fn disabled_tracker_never_reports() {
        let mut tracker = SequenceTracker::new(GapDetectionConfig {
            enabled: false,
            ..config(0, true)
        });
        tracker.check("book", "BTC/USD", 100);
        assert_eq!(tracker.check("book", "BTC/USD", 500), None);
    }
}
