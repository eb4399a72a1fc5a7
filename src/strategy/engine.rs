use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{Ohlc, OrderBook, Ticker, Trade};

use super::{Alert, AlertStrategy};

/// Owns every registered strategy and fans events out to the ones that
/// advertise interest in the symbol and event kind. A strategy that panics
/// mid-check is caught and skipped for that event; it does not halt
/// evaluation of the remaining strategies.
#[derive(Default)]
pub struct StrategyEngine {
    next_id: AtomicU64,
    strategies: Mutex<HashMap<u64, Box<dyn AlertStrategy>>>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, strategy: Box<dyn AlertStrategy>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.strategies.lock().insert(id, strategy);
        id
    }

    pub fn unregister(&self, id: u64) -> bool {
        self.strategies.lock().remove(&id).is_some()
    }

    fn covers(strategy: &dyn AlertStrategy, symbol: &str) -> bool {
        strategy.is_enabled() && strategy.symbols().iter().any(|s| s == symbol)
    }

    /// Runs one strategy predicate, catching a panic rather than letting it
    /// unwind into the caller. The error message (when present) is for the
    /// caller to forward to the runtime's error callback — this engine has
    /// no handle back to it.
    fn run_checked<F>(name: &str, mut f: F) -> Result<Option<Alert>, String>
    where
        F: FnMut() -> Option<Alert>,
    {
        match catch_unwind(AssertUnwindSafe(|| f())) {
            Ok(alert) => Ok(alert),
            Err(_) => {
                tracing::error!(strategy = name, "strategy panicked during evaluation");
                Err(format!("strategy '{name}' panicked during evaluation"))
            }
        }
    }

    /// Fired alerts plus any strategy-panic messages, both collected for the
    /// caller to dispatch (alerts to `on_alert`, panics to `on_error`).
    pub fn evaluate_ticker(&self, ticker: &Ticker) -> (Vec<Alert>, Vec<String>) {
        let mut strategies = self.strategies.lock();
        let mut alerts = Vec::new();
        let mut panics = Vec::new();
        for strategy in strategies.values_mut() {
            if !Self::covers(strategy.as_ref(), &ticker.symbol) {
                continue;
            }
            let name = strategy.name().to_string();
            match Self::run_checked(&name, || strategy.check_ticker(ticker)) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(message) => panics.push(message),
            }
        }
        (alerts, panics)
    }

    pub fn evaluate_ticker_and_book(&self, ticker: &Ticker, book: &OrderBook) -> (Vec<Alert>, Vec<String>) {
        let mut strategies = self.strategies.lock();
        let mut alerts = Vec::new();
        let mut panics = Vec::new();
        for strategy in strategies.values_mut() {
            if !Self::covers(strategy.as_ref(), &ticker.symbol) || !strategy.needs_orderbook() {
                continue;
            }
            let name = strategy.name().to_string();
            match Self::run_checked(&name, || strategy.check_ticker_and_book(ticker, book)) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(message) => panics.push(message),
            }
        }
        (alerts, panics)
    }

    pub fn evaluate_book(&self, book: &OrderBook) -> (Vec<Alert>, Vec<String>) {
        let mut strategies = self.strategies.lock();
        let mut alerts = Vec::new();
        let mut panics = Vec::new();
        for strategy in strategies.values_mut() {
            if !Self::covers(strategy.as_ref(), &book.symbol) {
                continue;
            }
            let name = strategy.name().to_string();
            match Self::run_checked(&name, || strategy.check_book(book)) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(message) => panics.push(message),
            }
        }
        (alerts, panics)
    }

    pub fn evaluate_trade(&self, trade: &Trade) -> (Vec<Alert>, Vec<String>) {
        let mut strategies = self.strategies.lock();
        let mut alerts = Vec::new();
        let mut panics = Vec::new();
        for strategy in strategies.values_mut() {
            if !Self::covers(strategy.as_ref(), &trade.symbol) {
                continue;
            }
            let name = strategy.name().to_string();
            match Self::run_checked(&name, || strategy.check_trade(trade)) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(message) => panics.push(message),
            }
        }
        (alerts, panics)
    }

    pub fn evaluate_ohlc(&self, ohlc: &Ohlc) -> (Vec<Alert>, Vec<String>) {
        let mut strategies = self.strategies.lock();
        let mut alerts = Vec::new();
        let mut panics = Vec::new();
        for strategy in strategies.values_mut() {
            if !Self::covers(strategy.as_ref(), &ohlc.symbol) {
                continue;
            }
            let name = strategy.name().to_string();
            match Self::run_checked(&name, || strategy.check_ohlc(ohlc)) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(message) => panics.push(message),
            }
        }
        (alerts, panics)
    }

    pub fn len(&self) -> usize {
        self.strategies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
