use std::time::{Duration, Instant};

use crate::types::Ticker;

use super::{Alert, AlertStrategy};

/// Fires when a symbol's last trade price crosses an upper and/or lower
/// threshold. One-shot by default; `recurring(true)` re-arms after each
/// fire subject to `cooldown`.
pub struct PriceAlert {
    symbol: String,
    above: Option<f64>,
    below: Option<f64>,
    recurring: bool,
    cooldown: Duration,
    fired: bool,
    fire_count: u32,
    last_fired_at: Option<Instant>,
    enabled: bool,
}

impl PriceAlert {
    pub fn builder(symbol: impl Into<String>) -> PriceAlertBuilder {
        PriceAlertBuilder {
            symbol: symbol.into(),
            above: None,
            below: None,
            recurring: false,
            cooldown: Duration::ZERO,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn fire_count(&self) -> u32 {
        self.fire_count
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring
    }
}

pub struct PriceAlertBuilder {
    symbol: String,
    above: Option<f64>,
    below: Option<f64>,
    recurring: bool,
    cooldown: Duration,
}

impl PriceAlertBuilder {
    pub fn above(mut self, price: f64) -> Self {
        self.above = Some(price);
        self
    }

    pub fn below(mut self, price: f64) -> Self {
        self.below = Some(price);
        self
    }

    pub fn recurring(mut self, recurring: bool) -> Self {
        self.recurring = recurring;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn build(self) -> PriceAlert {
        PriceAlert {
            symbol: self.symbol,
            above: self.above,
            below: self.below,
            recurring: self.recurring,
            cooldown: self.cooldown,
            fired: false,
            fire_count: 0,
            last_fired_at: None,
            enabled: true,
        }
    }
}

impl AlertStrategy for PriceAlert {
    fn name(&self) -> &str {
        "price_alert"
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn check_ticker(&mut self, ticker: &Ticker) -> Option<Alert> {
        if !self.enabled || ticker.symbol != self.symbol {
            return None;
        }

        if let Some(last_fired) = self.last_fired_at {
            if last_fired.elapsed() < self.cooldown {
                return None;
            }
        }

        if !self.recurring && self.fired {
            return None;
        }

        let crossed_above = self.above.map(|t| ticker.last >= t).unwrap_or(false);
        let crossed_below = self.below.map(|t| ticker.last <= t).unwrap_or(false);

        if !crossed_above && !crossed_below {
            return None;
        }

        self.fired = true;
        self.fire_count += 1;
        self.last_fired_at = Some(Instant::now());

        let message = if crossed_above {
            format!(
                "{} crossed above {:.2} (last {:.2})",
                self.symbol,
                self.above.unwrap(),
                ticker.last
            )
        } else {
            format!(
                "{} crossed below {:.2} (last {:.2})",
                self.symbol,
                self.below.unwrap(),
                ticker.last
            )
        };

        Some(Alert::new("price_alert", &self.symbol, ticker.last, message))
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
        self.fired = false;
        self.last_fired_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, last: f64) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            bid: last - 1.0,
            ask: last + 1.0,
            last,
            volume_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn fires_once_by_default() {
        let mut alert = PriceAlert::builder("BTC/USD").above(100.0).build();
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_some());
        assert!(alert.check_ticker(&ticker("BTC/USD", 102.0)).is_none());
        assert_eq!(alert.fire_count(), 1);
    }

    #[test]
    fn recurring_fires_repeatedly_without_cooldown() {
        let mut alert = PriceAlert::builder("BTC/USD")
            .above(100.0)
            .recurring(true)
            .build();
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_some());
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_some());
        assert_eq!(alert.fire_count(), 2);
    }

    #[test]
    fn cooldown_suppresses_immediate_refire() {
        let mut alert = PriceAlert::builder("BTC/USD")
            .above(100.0)
            .recurring(true)
            .cooldown(Duration::from_secs(60))
            .build();
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_some());
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_none());
    }

    #[test]
    fn ignores_other_symbols() {
        let mut alert = PriceAlert::builder("BTC/USD").above(100.0).build();
        assert!(alert.check_ticker(&ticker("ETH/USD", 1000.0)).is_none());
    }

    #[test]
    fn reset_clears_fired_state() {
        let mut alert = PriceAlert::builder("BTC/USD").above(100.0).build();
        alert.check_ticker(&ticker("BTC/USD", 101.0));
        assert!(alert.has_fired());
        alert.reset();
        assert!(!alert.has_fired());
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_some());
    }

    #[test]
    fn disabled_strategy_never_fires() {
        let mut alert = PriceAlert::builder("BTC/USD").above(100.0).build();
        alert.disable();
        assert!(alert.check_ticker(&ticker("BTC/USD", 101.0)).is_none());
    }
}
