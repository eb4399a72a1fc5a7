use std::collections::{HashMap, VecDeque};

use crate::types::Ticker;

use super::{Alert, AlertStrategy};

/// Fires when a symbol's 24h volume exceeds `multiplier` times its trailing
/// average over `lookback` samples. Needs at least half a full lookback
/// window of history before it will fire, to avoid false positives on a
/// freshly-started stream.
pub struct VolumeSpike {
    symbols: Vec<String>,
    multiplier: f64,
    lookback: usize,
    history: HashMap<String, VecDeque<f64>>,
    enabled: bool,
}

impl VolumeSpike {
    pub fn builder(symbols: Vec<String>) -> VolumeSpikeBuilder {
        VolumeSpikeBuilder {
            symbols,
            multiplier: 2.0,
            lookback: 20,
        }
    }
}

pub struct VolumeSpikeBuilder {
    symbols: Vec<String>,
    multiplier: f64,
    lookback: usize,
}

impl VolumeSpikeBuilder {
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn build(self) -> VolumeSpike {
        VolumeSpike {
            symbols: self.symbols,
            multiplier: self.multiplier,
            lookback: self.lookback,
            history: HashMap::new(),
            enabled: true,
        }
    }
}

impl AlertStrategy for VolumeSpike {
    fn name(&self) -> &str {
        "volume_spike"
    }

    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn check_ticker(&mut self, ticker: &Ticker) -> Option<Alert> {
        if !self.enabled || !self.symbols.iter().any(|s| s == &ticker.symbol) {
            return None;
        }

        let history = self.history.entry(ticker.symbol.clone()).or_default();
        let current = ticker.volume_24h;

        let min_samples = self.lookback / 2;
        let result = if history.len() >= min_samples.max(1) {
            let avg = history.iter().sum::<f64>() / history.len() as f64;
            if avg > 0.0 && current > avg * self.multiplier {
                Some(Alert::new(
                    "volume_spike",
                    &ticker.symbol,
                    ticker.last,
                    format!(
                        "{} volume {:.2} is {:.1}x its {}-sample average of {:.2}",
                        ticker.symbol,
                        current,
                        current / avg,
                        history.len(),
                        avg
                    ),
                ))
            } else {
                None
            }
        } else {
            None
        };

        history.push_back(current);
        if history.len() > self.lookback {
            history.pop_front();
        }

        result
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, volume: f64) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            bid: 0.0,
            ask: 0.0,
            last: 100.0,
            volume_24h: volume,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn requires_minimum_history_before_firing() {
        let mut strategy = VolumeSpike::builder(vec!["BTC/USD".to_string()])
            .lookback(10)
            .multiplier(2.0)
            .build();
        // fewer than lookback/2=5 samples: never fires even on a huge spike
        for _ in 0..4 {
            assert!(strategy.check_ticker(&ticker("BTC/USD", 100.0)).is_none());
        }
        assert!(strategy.check_ticker(&ticker("BTC/USD", 10000.0)).is_none());
    }

    #[test]
    fn fires_once_enough_history_and_spike_exceeds_multiplier() {
        let mut strategy = VolumeSpike::builder(vec!["BTC/USD".to_string()])
            .lookback(10)
            .multiplier(2.0)
            .build();
        for _ in 0..6 {
            strategy.check_ticker(&ticker("BTC/USD", 100.0));
        }
        assert!(strategy.check_ticker(&ticker("BTC/USD", 300.0)).is_some());
    }

    #[test]
    fn history_trims_to_lookback() {
        let mut strategy = VolumeSpike::builder(vec!["BTC/USD".to_string()])
            .lookback(3)
            .multiplier(2.0)
            .build();
        for v in [100.0, 100.0, 100.0, 100.0, 100.0] {
            strategy.check_ticker(&ticker("BTC/USD", v));
        }
        assert_eq!(strategy.history.get("BTC/USD").unwrap().len(), 3);
    }

    #[test]
    fn ignores_untracked_symbols() {
        let mut strategy = VolumeSpike::builder(vec!["BTC/USD".to_string()])
            .lookback(4)
            .build();
        assert!(strategy.check_ticker(&ticker("ETH/USD", 99999.0)).is_none());
    }
}
