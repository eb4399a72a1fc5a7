//! Core data types shared across the streaming runtime.

use std::time::Instant;

/// Channel types for WebSocket subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Ticker,
    Trade,
    Book,
    Ohlc,
    OwnTrades,
    OpenOrders,
    Balances,
}

impl Channel {
    /// The wire name used in `params.channel` for subscribe/unsubscribe frames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ticker => "ticker",
            Channel::Trade => "trade",
            Channel::Book => "book",
            Channel::Ohlc => "ohlc",
            Channel::OwnTrades => "ownTrades",
            Channel::OpenOrders => "openOrders",
            Channel::Balances => "balances",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ticker" => Some(Channel::Ticker),
            "trade" => Some(Channel::Trade),
            "book" => Some(Channel::Book),
            "ohlc" => Some(Channel::Ohlc),
            "ownTrades" => Some(Channel::OwnTrades),
            "openOrders" => Some(Channel::OpenOrders),
            "balances" => Some(Channel::Balances),
            _ => None,
        }
    }

    /// Private channels require an auth token in the outbound subscribe frame.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Channel::OwnTrades | Channel::OpenOrders | Channel::Balances
        )
    }
}

/// Side of a trade or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// Real-time ticker snapshot for a trading pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub timestamp: String,
}

impl Ticker {
    /// `ask - bid`.
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// `(bid + ask) / 2`.
    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread as a percentage of mid price, 0 when mid <= 0.
    pub fn spread_percent(&self) -> f64 {
        let mid = self.mid_price();
        if mid > 0.0 {
            (self.spread() / mid) * 100.0
        } else {
            0.0
        }
    }
}

/// A single trade execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub side: Side,
    pub timestamp: String,
}

/// A single price/quantity level. Quantity 0 denotes deletion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// A read-only snapshot of an order book's current ladders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub is_valid: bool,
    pub checksum: u32,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// 0.0 if either side is empty.
    pub fn spread(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => a.price - b.price,
            _ => 0.0,
        }
    }

    /// 0.0 if either side is empty.
    pub fn mid_price(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => (b.price + a.price) / 2.0,
            _ => 0.0,
        }
    }

    pub fn total_bid_liquidity(&self, depth: usize) -> f64 {
        self.bids.iter().take(depth).map(|l| l.quantity).sum()
    }

    pub fn total_ask_liquidity(&self, depth: usize) -> f64 {
        self.asks.iter().take(depth).map(|l| l.quantity).sum()
    }

    /// In `[-1, 1]`; positive favors bids. 0.0 if total liquidity is negligible.
    pub fn imbalance(&self, depth: usize) -> f64 {
        let bid = self.total_bid_liquidity(depth);
        let ask = self.total_ask_liquidity(depth);
        let total = bid + ask;
        if total < 0.0001 {
            0.0
        } else {
            (bid - ask) / total
        }
    }
}

/// A single OHLC candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Ohlc {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: i64,
    pub interval: i32,
}

/// Private-channel payload: opaque beyond routing and callback delivery.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OwnTrade {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Balance {
    pub asset: String,
    pub balance: f64,
}

/// A `Subscribed`/`Unsubscribed` acknowledgement from the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionAck {
    pub channel: String,
    pub symbols: Vec<String>,
}

/// The tagged variant produced by the wire codec and carried through the queue.
#[derive(Debug, Clone)]
pub enum Event {
    Ticker(Ticker),
    Trade(Trade),
    Book(OrderBook),
    Ohlc(Ohlc),
    Order(Order),
    OwnTrade(OwnTrade),
    Balance(Balance),
    Subscribed(SubscriptionAck),
    Unsubscribed(SubscriptionAck),
    Heartbeat,
    Error(crate::error::ErrorKind, String),
}

impl Event {
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Event::Ticker(_) => Some(Channel::Ticker),
            Event::Trade(_) => Some(Channel::Trade),
            Event::Book(_) => Some(Channel::Book),
            Event::Ohlc(_) => Some(Channel::Ohlc),
            Event::Order(_) => Some(Channel::OpenOrders),
            Event::OwnTrade(_) => Some(Channel::OwnTrades),
            Event::Balance(_) => Some(Channel::Balances),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Event::Ticker(t) => Some(&t.symbol),
            Event::Trade(t) => Some(&t.symbol),
            Event::Book(b) => Some(&b.symbol),
            Event::Ohlc(o) => Some(&o.symbol),
            Event::Order(o) => Some(&o.symbol),
            Event::OwnTrade(t) => Some(&t.symbol),
            _ => None,
        }
    }
}

/// A queued event plus the bookkeeping the runtime needs once it's popped.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: Event,
    pub receive_time: Instant,
    pub sequence: Option<u64>,
    /// Only meaningful when `event` is `Event::Book`: snapshot vs. incremental.
    pub book_is_snapshot: bool,
    /// Only meaningful when `event` is `Event::Book`: the exchange-supplied
    /// checksum to validate the rendered ladder against.
    pub book_checksum: Option<u32>,
}
