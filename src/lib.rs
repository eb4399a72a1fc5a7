//! A streaming client for Kraken's WebSocket v2 market-data API.
//!
//! [`Runtime`] owns a single TLS connection, a reconnect state machine backed
//! by a configurable [`backoff`] policy and [`breaker::CircuitBreaker`], a
//! per-symbol [`book::BookEngine`] that maintains checksum-validated order
//! book ladders, and an [`strategy::AlertStrategy`] engine evaluated against
//! every event. Register callbacks, subscribe to channels through
//! [`registry::SubscriptionRegistry`], then call [`Runtime::run`] or
//! [`Runtime::run_async`].
//!
//! ```no_run
//! use kraken_stream_rs::{ClientConfig, Channel, Runtime};
//!
//! let config = ClientConfig::new("wss://ws.kraken.com/v2");
//! let runtime = Runtime::new(config);
//! runtime.on_ticker(|t| println!("{}: {}", t.symbol, t.last));
//! runtime.subscribe(Channel::Ticker, vec!["BTC/USD".to_string()], 0);
//! runtime.run().unwrap();
//! ```

pub mod backoff;
pub mod book;
pub mod breaker;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod ratelimit;
pub mod registry;
pub mod runtime;
pub mod sequence;
pub mod strategy;
pub mod transport;
pub mod types;

pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff, NoBackoff};
pub use book::BookEngine;
pub use breaker::CircuitBreaker;
pub use config::{ClientConfig, GapDetectionConfig, GapRecoveryAction, RateLimiterConfig};
pub use error::{Error, ErrorKind, Result};
pub use metrics::MetricsSnapshot;
pub use registry::{Subscription, SubscriptionRegistry};
pub use runtime::Runtime;
pub use sequence::GapInfo;
pub use strategy::{Alert, AlertStrategy, StrategyEngine, StrategyPresets};
pub use types::{
    Balance, Channel, ConnectionState, Event, Ohlc, Order, OrderBook, OwnTrade, PriceLevel, Side,
    SubscriptionAck, Ticker, Trade,
};
