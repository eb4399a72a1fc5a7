use crate::types::{OrderBook, Ticker};

use super::composite::{CompositeMode, CompositeStrategy};
use super::{Alert, AlertStrategy};
use super::{PriceAlert, VolumeSpike};

/// Ready-made strategies for the common cases: a price breakout confirmed
/// by volume, and joint price/liquidity checks against a support or
/// resistance level.
pub struct StrategyPresets;

impl StrategyPresets {
    /// Price crossing above `level`, confirmed by a >=`volume_multiplier`
    /// volume spike over the trailing 20 samples. Recurring.
    pub fn breakout(symbol: impl Into<String>, level: f64, volume_multiplier: f64) -> CompositeStrategy {
        let symbol = symbol.into();
        let price = PriceAlert::builder(symbol.clone())
            .above(level)
            .recurring(true)
            .build();
        let volume = VolumeSpike::builder(vec![symbol])
            .multiplier(volume_multiplier)
            .lookback(20)
            .build();
        CompositeStrategy::new(
            "breakout",
            CompositeMode::And,
            vec![Box::new(price), Box::new(volume)],
        )
    }

    /// Fires when price dips within `tolerance_percent` of a support level
    /// AND the book shows at least `min_liquidity` total bid size within the
    /// top 5 levels — a support level that isn't backed by real demand is
    /// not worth alerting on.
    pub fn support_level(
        symbol: impl Into<String>,
        level: f64,
        tolerance_percent: f64,
        min_liquidity: f64,
    ) -> Box<dyn AlertStrategy> {
        Box::new(LevelStrategy {
            name: "support_level".to_string(),
            symbol: symbol.into(),
            level,
            tolerance_percent,
            min_liquidity,
            direction: LevelDirection::Support,
            enabled: true,
        })
    }

    /// Fires when price rallies within `tolerance_percent` of a resistance
    /// level AND the book shows at least `min_liquidity` total ask size
    /// within the top 5 levels.
    pub fn resistance_level(
        symbol: impl Into<String>,
        level: f64,
        tolerance_percent: f64,
        min_liquidity: f64,
    ) -> Box<dyn AlertStrategy> {
        Box::new(LevelStrategy {
            name: "resistance_level".to_string(),
            symbol: symbol.into(),
            level,
            tolerance_percent,
            min_liquidity,
            direction: LevelDirection::Resistance,
            enabled: true,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelDirection {
    Support,
    Resistance,
}

const LIQUIDITY_DEPTH: usize = 5;

struct LevelStrategy {
    name: String,
    symbol: String,
    level: f64,
    tolerance_percent: f64,
    min_liquidity: f64,
    direction: LevelDirection,
    enabled: bool,
}

impl AlertStrategy for LevelStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn needs_orderbook(&self) -> bool {
        true
    }

    fn check_ticker_and_book(&mut self, ticker: &Ticker, book: &OrderBook) -> Option<Alert> {
        if !self.enabled || ticker.symbol != self.symbol || book.symbol != self.symbol {
            return None;
        }

        let distance_percent = ((ticker.last - self.level) / self.level).abs() * 100.0;
        if distance_percent > self.tolerance_percent {
            return None;
        }

        let liquidity = match self.direction {
            LevelDirection::Support => book.total_bid_liquidity(LIQUIDITY_DEPTH),
            LevelDirection::Resistance => book.total_ask_liquidity(LIQUIDITY_DEPTH),
        };
        if liquidity < self.min_liquidity {
            return None;
        }

        Some(Alert::new(
            &self.name,
            &self.symbol,
            ticker.last,
            format!(
                "{} near {} {:.2} (within {:.2}%), liquidity {:.2}",
                self.symbol, self.name, self.level, distance_percent, liquidity
            ),
        ))
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
    use crate::types::PriceLevel;

    fn ticker(last: f64) -> Ticker {
        Ticker {
            symbol: "BTC/USD".to_string(),
            bid: last,
            ask: last,
            last,
            volume_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }
    }

    fn book_with_bids(total_qty: f64) -> OrderBook {
        OrderBook {
            symbol: "BTC/USD".to_string(),
            bids: vec![PriceLevel {
                price: 99.0,
                quantity: total_qty,
            }],
            asks: vec![],
            is_valid: true,
            checksum: 0,
        }
    }

    #[test]
    fn support_requires_both_proximity_and_liquidity() {
        let mut strategy = StrategyPresets::support_level("BTC/USD", 100.0, 1.0, 5.0);
        assert!(strategy
            .check_ticker_and_book(&ticker(100.5), &book_with_bids(2.0))
            .is_none()); // not enough liquidity
        assert!(strategy
            .check_ticker_and_book(&ticker(200.0), &book_with_bids(10.0))
            .is_none()); // too far from level
        assert!(strategy
            .check_ticker_and_book(&ticker(100.5), &book_with_bids(10.0))
            .is_some());
    }

    #[test]
    fn breakout_is_and_of_price_and_volume() {
        let mut breakout = StrategyPresets::breakout("BTC/USD", 100.0, 2.0);
        assert!(breakout.needs_trades() == false);
        // Drives enough history for the volume child, then the spike.
        for _ in 0..12 {
            breakout.check_ticker(&ticker(50.0));
        }
        assert!(breakout.check_ticker(&ticker(150.0)).is_none());
    }
}
