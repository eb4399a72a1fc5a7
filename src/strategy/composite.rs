use crate::types::{Ohlc, OrderBook, Ticker, Trade};

use super::{Alert, AlertStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    And,
    Or,
}

/// Combines child strategies with AND/OR semantics. `check_*` calls are
/// fanned out to every enabled child; under AND every enabled child must
/// fire for the composite to fire, under OR any one firing is enough. A
/// disabled child never blocks an AND (it's skipped, not treated as failed).
pub struct CompositeStrategy {
    name: String,
    mode: CompositeMode,
    children: Vec<Box<dyn AlertStrategy>>,
    enabled: bool,
}

impl CompositeStrategy {
    /// Panics if `children` is empty — a composite strategy with nothing to
    /// combine is a caller bug.
    pub fn new(name: impl Into<String>, mode: CompositeMode, children: Vec<Box<dyn AlertStrategy>>) -> Self {
        assert!(
            !children.is_empty(),
            "composite strategy requires at least one child"
        );
        Self {
            name: name.into(),
            mode,
            children,
            enabled: true,
        }
    }

    fn combine(&mut self, mut fire: impl FnMut(&mut Box<dyn AlertStrategy>) -> Option<Alert>) -> Option<Alert> {
        if !self.enabled {
            return None;
        }

        let mut fired: Vec<Alert> = Vec::new();
        let mut enabled_count = 0;

        for child in self.children.iter_mut() {
            if !child.is_enabled() {
                continue;
            }
            enabled_count += 1;
            if let Some(alert) = fire(child) {
                fired.push(alert);
            }
        }

        if enabled_count == 0 {
            return None;
        }

        let triggered = match self.mode {
            CompositeMode::And => fired.len() == enabled_count,
            CompositeMode::Or => !fired.is_empty(),
        };

        if !triggered {
            return None;
        }

        let representative = fired.into_iter().next()?;
        let symbol = representative.symbol.clone();
        let price = representative.price;
        let message = format!("{} composite triggered: {}", self.name, representative.message);
        Some(Alert::new(&self.name, symbol, price, message))
    }
}

impl AlertStrategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .children
            .iter()
            .flat_map(|c| c.symbols())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    fn check_ticker(&mut self, ticker: &Ticker) -> Option<Alert> {
        self.combine(|child| child.check_ticker(ticker))
    }

    fn check_book(&mut self, book: &OrderBook) -> Option<Alert> {
        self.combine(|child| child.check_book(book))
    }

    fn check_trade(&mut self, trade: &Trade) -> Option<Alert> {
        self.combine(|child| child.check_trade(trade))
    }

    fn check_ohlc(&mut self, ohlc: &Ohlc) -> Option<Alert> {
        self.combine(|child| child.check_ohlc(ohlc))
    }

    fn check_ticker_and_book(&mut self, ticker: &Ticker, book: &OrderBook) -> Option<Alert> {
        self.combine(|child| child.check_ticker_and_book(ticker, book))
    }

    fn needs_orderbook(&self) -> bool {
        self.children.iter().any(|c| c.needs_orderbook())
    }

    fn needs_trades(&self) -> bool {
        self.children.iter().any(|c| c.needs_trades())
    }

    fn needs_ohlc(&self) -> bool {
        self.children.iter().any(|c| c.needs_ohlc())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn enable(&mut self) {
        self.enabled = true;
        for child in self.children.iter_mut() {
            child.enable();
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
        for child in self.children.iter_mut() {
            child.disable();
        }
    }

    fn reset(&mut self) {
        for child in self.children.iter_mut() {
            child.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{PriceAlert, VolumeSpike};

    fn ticker(symbol: &str, last: f64, volume: f64) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            bid: last - 1.0,
            ask: last + 1.0,
            last,
            volume_24h: volume,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    #[test]
    #[should_panic(expected = "at least one child")]
    fn empty_children_panics() {
        CompositeStrategy::new("empty", CompositeMode::And, vec![]);
    }

    #[test]
    fn and_requires_all_children_to_fire() {
        let price = PriceAlert::builder("BTC/USD").above(100.0).recurring(true).build();
        let volume = VolumeSpike::builder(vec!["BTC/USD".to_string()])
            .lookback(4)
            .multiplier(1.5)
            .build();
        let mut composite = CompositeStrategy::new(
            "breakout",
            CompositeMode::And,
            vec![Box::new(price), Box::new(volume)],
        );

        // price alone fires, volume needs history first: no composite alert yet
        for _ in 0..2 {
            assert!(composite.check_ticker(&ticker("BTC/USD", 50.0, 10.0)).is_none());
        }
        // price now above threshold but volume still normal
        assert!(composite.check_ticker(&ticker("BTC/USD", 150.0, 10.0)).is_none());
        // volume spikes too: both fire
        assert!(composite.check_ticker(&ticker("BTC/USD", 150.0, 100.0)).is_some());
    }

    #[test]
    fn or_fires_on_any_child() {
        let a = PriceAlert::builder("BTC/USD").above(1000.0).build();
        let b = PriceAlert::builder("BTC/USD").below(10.0).recurring(true).build();
        let mut composite = CompositeStrategy::new(
            "either",
            CompositeMode::Or,
            vec![Box::new(a), Box::new(b)],
        );
        assert!(composite.check_ticker(&ticker("BTC/USD", 5.0, 0.0)).is_some());
    }

    #[test]
    fn symbols_are_unioned_and_deduped() {
        let a = PriceAlert::builder("BTC/USD").above(1.0).build();
        let b = PriceAlert::builder("ETH/USD").above(1.0).build();
        let c = PriceAlert::builder("BTC/USD").below(1.0).build();
        let composite = CompositeStrategy::new(
            "multi",
            CompositeMode::Or,
            vec![Box::new(a), Box::new(b), Box::new(c)],
        );
        assert_eq!(composite.symbols(), vec!["BTC/USD".to_string(), "ETH/USD".to_string()]);
    }

    #[test]
    fn disable_cascades_to_children() {
        let a = PriceAlert::builder("BTC/USD").above(1.0).build();
        let mut composite = CompositeStrategy::new("solo", CompositeMode::Or, vec![Box::new(a)]);
        composite.disable();
        assert!(composite.check_ticker(&ticker("BTC/USD", 100.0, 0.0)).is_none());
    }
}
