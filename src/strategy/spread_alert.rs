use crate::types::Ticker;

use super::{Alert, AlertStrategy};

/// Fires when a symbol's bid/ask spread falls outside `[min_spread,
/// max_spread]` — either too tight (suspicious/stale quotes) or too wide
/// (illiquid market).
pub struct SpreadAlert {
    symbol: String,
    min_spread: f64,
    max_spread: f64,
    enabled: bool,
}

impl SpreadAlert {
    pub fn new(symbol: impl Into<String>, min_spread: f64, max_spread: f64) -> Self {
        Self {
            symbol: symbol.into(),
            min_spread,
            max_spread,
            enabled: true,
        }
    }
}

impl AlertStrategy for SpreadAlert {
    fn name(&self) -> &str {
        "spread_alert"
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn check_ticker(&mut self, ticker: &Ticker) -> Option<Alert> {
        if !self.enabled || ticker.symbol != self.symbol {
            return None;
        }

        let spread = ticker.spread();
        if spread < self.min_spread || spread > self.max_spread {
            Some(Alert::new(
                "spread_alert",
                &self.symbol,
                ticker.last,
                format!(
                    "{} spread {:.4} outside [{:.4}, {:.4}]",
                    self.symbol, spread, self.min_spread, self.max_spread
                ),
            ))
        } else {
            None
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(bid: f64, ask: f64) -> Ticker {
        Ticker {
            symbol: "BTC/USD".to_string(),
            bid,
            ask,
            last: (bid + ask) / 2.0,
            volume_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn fires_when_spread_too_wide() {
        let mut alert = SpreadAlert::new("BTC/USD", 1.0, 10.0);
        assert!(alert.check_ticker(&ticker(100.0, 120.0)).is_some());
    }

    #[test]
    fn fires_when_spread_too_tight() {
        let mut alert = SpreadAlert::new("BTC/USD", 1.0, 10.0);
        assert!(alert.check_ticker(&ticker(100.0, 100.1)).is_some());
    }

    #[test]
    fn silent_within_range() {
        let mut alert = SpreadAlert::new("BTC/USD", 1.0, 10.0);
        assert!(alert.check_ticker(&ticker(100.0, 105.0)).is_none());
    }
}
