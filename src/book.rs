//! Per-symbol order book engine: maintains price-sorted ladders from
//! snapshot/update wire messages and validates them against the exchange
//! checksum.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::checksum::compute_checksum;
use crate::types::{OrderBook, PriceLevel};

/// A single symbol's ladder. Bids are kept descending (best bid first), asks
/// ascending (best ask first); a quantity of 0.0 deletes the level.
///
/// `last_valid` persists the result of the most recent checksum comparison
/// so a later message carrying no checksum doesn't implicitly flip a known-bad
/// book back to valid; a new snapshot resets it since there's nothing yet to
/// compare against.
#[derive(Debug)]
struct Ladder {
    bids: BTreeMap<Reverse<OrderedFloat<f64>>, f64>,
    asks: BTreeMap<OrderedFloat<f64>, f64>,
    last_valid: bool,
}

impl Default for Ladder {
    fn default() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_valid: true,
        }
    }
}

impl Ladder {
    fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.clear();
        self.asks.clear();
        for level in bids {
            if level.quantity == 0.0 {
                continue;
            }
            self.bids.insert(Reverse(OrderedFloat(level.price)), level.quantity);
        }
        for level in asks {
            if level.quantity == 0.0 {
                continue;
            }
            self.asks.insert(OrderedFloat(level.price), level.quantity);
        }
        self.last_valid = true;
    }

    fn apply_update(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        for level in bids {
            if level.quantity == 0.0 {
                self.bids.remove(&Reverse(OrderedFloat(level.price)));
            } else {
                self.bids.insert(Reverse(OrderedFloat(level.price)), level.quantity);
            }
        }
        for level in asks {
            if level.quantity == 0.0 {
                self.asks.remove(&OrderedFloat(level.price));
            } else {
                self.asks.insert(OrderedFloat(level.price), level.quantity);
            }
        }
    }

    fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .map(|(Reverse(price), quantity)| PriceLevel {
                price: price.0,
                quantity: *quantity,
            })
            .collect()
    }

    fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(price, quantity)| PriceLevel {
                price: price.0,
                quantity: *quantity,
            })
            .collect()
    }
}

/// Owns one [`Ladder`] per subscribed symbol and renders each as the public
/// [`OrderBook`] snapshot type, including checksum validation.
#[derive(Default)]
pub struct BookEngine {
    ladders: HashMap<String, Ladder>,
}

impl BookEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a symbol's ladder wholesale. `checksum` is the
    /// exchange-supplied value to validate against, if any.
    pub fn apply_snapshot(
        &mut self,
        symbol: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        checksum: Option<u32>,
    ) -> OrderBook {
        let ladder = self.ladders.entry(symbol.to_string()).or_default();
        ladder.apply_snapshot(bids, asks);
        self.render(symbol, checksum)
    }

    /// Merges incremental level changes into a symbol's existing ladder.
    pub fn apply_update(
        &mut self,
        symbol: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
        checksum: Option<u32>,
    ) -> OrderBook {
        let ladder = self.ladders.entry(symbol.to_string()).or_default();
        ladder.apply_update(bids, asks);
        self.render(symbol, checksum)
    }

    fn render(&mut self, symbol: &str, checksum: Option<u32>) -> OrderBook {
        let ladder = self.ladders.entry(symbol.to_string()).or_default();
        let bids = ladder.bid_levels();
        let asks = ladder.ask_levels();

        if let Some(expected) = checksum {
            ladder.last_valid = compute_checksum(&bids, &asks) == expected;
        }
        let is_valid = ladder.last_valid;

        OrderBook {
            symbol: symbol.to_string(),
            bids,
            asks,
            is_valid,
            checksum: checksum.unwrap_or(0),
        }
    }

    /// Latest rendered snapshot for a symbol, `None` if never populated.
    pub fn snapshot(&mut self, symbol: &str) -> Option<OrderBook> {
        if self.ladders.contains_key(symbol) {
            Some(self.render(symbol, None))
        } else {
            None
        }
    }

    pub fn remove(&mut self, symbol: &str) {
        self.ladders.remove(symbol);
    }

    pub fn symbols(&self) -> Vec<String> {
        self.ladders.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, quantity: f64) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    #[test]
    fn snapshot_sorts_bids_descending_and_asks_ascending() {
        let mut engine = BookEngine::new();
        let book = engine.apply_snapshot(
            "BTC/USD",
            &[level(100.0, 1.0), level(102.0, 1.0), level(101.0, 1.0)],
            &[level(105.0, 1.0), level(103.0, 1.0), level(104.0, 1.0)],
            None,
        );
        assert_eq!(
            book.bids.iter().map(|l| l.price).collect::<Vec<_>>(),
            vec![102.0, 101.0, 100.0]
        );
        assert_eq!(
            book.asks.iter().map(|l| l.price).collect::<Vec<_>>(),
            vec![103.0, 104.0, 105.0]
        );
    }

    #[test]
    fn zero_quantity_update_deletes_level() {
        let mut engine = BookEngine::new();
        engine.apply_snapshot("BTC/USD", &[level(100.0, 1.0)], &[level(101.0, 1.0)], None);
        let book = engine.apply_update("BTC/USD", &[level(100.0, 0.0)], &[], None);
        assert!(book.bids.is_empty());
        assert_eq!(book.asks.len(), 1);
    }

    #[test]
    fn update_without_snapshot_starts_from_empty_book() {
        let mut engine = BookEngine::new();
        let book = engine.apply_update("BTC/USD", &[level(100.0, 1.0)], &[], None);
        assert_eq!(book.bids.len(), 1);
    }

    #[test]
    fn zero_quantity_level_in_snapshot_is_dropped() {
        let mut engine = BookEngine::new();
        let book = engine.apply_snapshot(
            "BTC/USD",
            &[level(100.0, 1.0), level(99.0, 0.0)],
            &[level(101.0, 0.0)],
            None,
        );
        assert_eq!(book.bids.len(), 1);
        assert!(book.asks.is_empty());
    }

    #[test]
    fn invalid_checksum_persists_until_next_comparison() {
        let mut engine = BookEngine::new();
        engine.apply_snapshot("BTC/USD", &[level(100.0, 1.0)], &[], Some(1));
        let still_bad = engine.apply_update("BTC/USD", &[level(100.0, 1.0)], &[], None);
        assert!(!still_bad.is_valid);
    }

    #[test]
    fn checksum_mismatch_marks_book_invalid() {
        let mut engine = BookEngine::new();
        let book = engine.apply_snapshot(
            "BTC/USD",
            &[level(50000.0, 1.5), level(49999.0, 2.0)],
            &[level(50001.0, 1.0), level(50002.0, 3.0)],
            Some(887781321),
        );
        assert!(book.is_valid);

        let bad_book = engine.apply_update("BTC/USD", &[], &[], Some(1));
        assert!(!bad_book.is_valid);
    }

    #[test]
    fn multiple_symbols_are_independent() {
        let mut engine = BookEngine::new();
        engine.apply_snapshot("BTC/USD", &[level(100.0, 1.0)], &[], None);
        engine.apply_snapshot("ETH/USD", &[level(50.0, 1.0)], &[], None);
        assert_eq!(engine.symbols().len(), 2);
        assert_eq!(engine.snapshot("BTC/USD").unwrap().bids[0].price, 100.0);
        assert_eq!(engine.snapshot("ETH/USD").unwrap().bids[0].price, 50.0);
    }
}
