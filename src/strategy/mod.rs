//! Alert strategies: per-symbol predicates evaluated against live market
//! events, producing [`Alert`]s delivered to a user callback.

mod composite;
mod engine;
mod presets;
mod price_alert;
mod spread_alert;
mod volume_spike;

pub use composite::CompositeStrategy;
pub use engine::StrategyEngine;
pub use presets::StrategyPresets;
pub use price_alert::PriceAlert;
pub use spread_alert::SpreadAlert;
pub use volume_spike::VolumeSpike;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Ohlc, OrderBook, Ticker, Trade};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A fired alert, handed to the user's alert callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub strategy_name: String,
    pub symbol: String,
    pub price: f64,
    pub message: String,
    pub timestamp_ms: u64,
}

impl Alert {
    pub fn new(
        strategy_name: impl Into<String>,
        symbol: impl Into<String>,
        price: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            symbol: symbol.into(),
            price,
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }
}

/// A symbol-scoped predicate over market events. Default method bodies mean
/// a strategy only needs to override the event kinds it actually cares
/// about; `needs_*` tells the runtime which snapshots to keep around for it.
pub trait AlertStrategy: Send {
    fn name(&self) -> &str;

    fn symbols(&self) -> Vec<String>;

    fn check_ticker(&mut self, _ticker: &Ticker) -> Option<Alert> {
        None
    }

    fn check_book(&mut self, _book: &OrderBook) -> Option<Alert> {
        None
    }

    fn check_trade(&mut self, _trade: &Trade) -> Option<Alert> {
        None
    }

    fn check_ohlc(&mut self, _ohlc: &Ohlc) -> Option<Alert> {
        None
    }

    /// Joint evaluation for strategies that need both a ticker and the
    /// current book for the same symbol (e.g. support/resistance checks).
    fn check_ticker_and_book(&mut self, _ticker: &Ticker, _book: &OrderBook) -> Option<Alert> {
        None
    }

    fn needs_orderbook(&self) -> bool {
        false
    }

    fn needs_trades(&self) -> bool {
        false
    }

    fn needs_ohlc(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn enable(&mut self) {}

    fn disable(&mut self) {}

    fn reset(&mut self) {}
}
