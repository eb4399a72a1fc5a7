//! The runtime orchestrator: owns the transport, the event queue, and every
//! stateful component (book engine, sequence tracker, registry, strategy
//! engine, metrics), and runs the two worker loops described in the crate's
//! design notes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::backoff::BackoffPolicy;
use crate::book::BookEngine;
use crate::breaker::CircuitBreaker;
use crate::codec::{build_subscribe_message, build_unsubscribe_message, parse_message};
use crate::config::{ClientConfig, GapRecoveryAction};
use crate::error::{ErrorKind, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::queue::{self, Consumer, Producer};
use crate::ratelimit::RateLimiter;
use crate::registry::{CommandSink, Subscription, SubscriptionRegistry};
use crate::sequence::{GapInfo, SequenceTracker};
use crate::strategy::{Alert, AlertStrategy, StrategyEngine};
use crate::transport::Transport;
use crate::types::{
    Balance, Channel, ConnectionState, Event, Ohlc, Order, OrderBook, OwnTrade, QueuedEvent,
    SubscriptionAck, Ticker, Trade,
};

// Stored as `Arc` rather than `Box` so a caller can clone the callback out
// from under the `RwLock` and drop the lock before invoking it — otherwise a
// panicking callback whose handler re-enters `emit_error` would try to
// re-acquire a read lock this same thread already holds.
type TickerCb = Arc<dyn Fn(&Ticker) + Send + Sync>;
type TradeCb = Arc<dyn Fn(&Trade) + Send + Sync>;
type BookCb = Arc<dyn Fn(&OrderBook) + Send + Sync>;
type OhlcCb = Arc<dyn Fn(&Ohlc) + Send + Sync>;
type OrderCb = Arc<dyn Fn(&Order) + Send + Sync>;
type OwnTradeCb = Arc<dyn Fn(&OwnTrade) + Send + Sync>;
type BalanceCb = Arc<dyn Fn(&Balance) + Send + Sync>;
type AckCb = Arc<dyn Fn(&SubscriptionAck) + Send + Sync>;
type ErrorCb = Arc<dyn Fn(ErrorKind, &str) + Send + Sync>;
type ReconnectCb = Arc<dyn Fn(u32, Duration, &str) + Send + Sync>;
type AlertCb = Arc<dyn Fn(&Alert) + Send + Sync>;
type GapCb = Arc<dyn Fn(&GapInfo) + Send + Sync>;
type StateChangeCb = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_ticker: Option<TickerCb>,
    on_trade: Option<TradeCb>,
    on_book: Option<BookCb>,
    on_ohlc: Option<OhlcCb>,
    on_order: Option<OrderCb>,
    on_own_trade: Option<OwnTradeCb>,
    on_balance: Option<BalanceCb>,
    on_subscribed: Option<AckCb>,
    on_unsubscribed: Option<AckCb>,
    on_error: Option<ErrorCb>,
    on_reconnect: Option<ReconnectCb>,
    on_alert: Option<AlertCb>,
    on_gap: Option<GapCb>,
    on_state_change: Option<StateChangeCb>,
}

/// Catches a panicking callback and reports it through the error callback
/// rather than letting it unwind into the worker loop.
fn safe_invoke<F: FnOnce()>(runtime: &Runtime, label: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback = label, "user callback panicked");
        runtime.emit_error(ErrorKind::CallbackError, &format!("{label} callback panicked"));
    }
}

struct OutboundSink {
    transport: Arc<RwLock<Option<Arc<Transport>>>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    auth_token: Option<String>,
}

impl OutboundSink {
    fn send(&self, text: String) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire_blocking(Duration::ZERO);
        }
        if let Some(transport) = self.transport.read().clone() {
            if let Err(e) = transport.send(&text) {
                tracing::warn!(error = %e, "failed to send outbound frame");
            }
        }
    }
}

impl CommandSink for OutboundSink {
    fn send_subscribe(&self, channel: Channel, symbols: &[String], depth: u32) {
        let msg = build_subscribe_message(channel, symbols, depth, self.auth_token.as_deref());
        self.send(msg);
    }

    fn send_unsubscribe(&self, channel: Channel, symbols: &[String]) {
        let msg = build_unsubscribe_message(channel, symbols, self.auth_token.as_deref());
        self.send(msg);
    }
}

/// The streaming client. Construct with [`Runtime::new`] or
/// [`Runtime::offline`], register callbacks and strategies, then call
/// [`Runtime::run`] or [`Runtime::run_async`].
pub struct Runtime {
    config: ClientConfig,
    transport: Arc<RwLock<Option<Arc<Transport>>>>,
    offline: bool,

    book_engine: Mutex<BookEngine>,
    sequence_tracker: Mutex<SequenceTracker>,
    backoff: Mutex<Box<dyn BackoffPolicy>>,
    circuit_breaker: CircuitBreaker,
    rate_limiter: Option<Arc<RateLimiter>>,
    metrics: Metrics,
    pub registry: SubscriptionRegistry,
    pub strategies: StrategyEngine,

    latest_ticker: RwLock<std::collections::HashMap<String, Ticker>>,
    latest_book: RwLock<std::collections::HashMap<String, OrderBook>>,

    callbacks: RwLock<Callbacks>,

    queue_producer: Option<Producer<QueuedEvent>>,
    queue_consumer: Option<Consumer<QueuedEvent>>,
    queue_cond: Arc<(Mutex<()>, Condvar)>,

    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl Runtime {
    /// Builds a runtime wired to connect to `config.url` on [`Runtime::run`].
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Self::build(config, false)
    }

    /// Builds a runtime with no transport. Feed it events via
    /// [`Runtime::inject_event`] instead of calling `run`/`run_async`, e.g.
    /// to replay a recorded session through the same dispatch path.
    pub fn offline(config: ClientConfig) -> Arc<Self> {
        Self::build(config, true)
    }

    fn build(config: ClientConfig, offline: bool) -> Arc<Self> {
        let transport: Arc<RwLock<Option<Arc<Transport>>>> = Arc::new(RwLock::new(None));
        let rate_limiter = config.rate_limiter.map(|c| Arc::new(RateLimiter::new(c)));
        let sink = Arc::new(OutboundSink {
            transport: transport.clone(),
            rate_limiter: rate_limiter.clone(),
            auth_token: config.auth_token.clone(),
        });

        let (queue_producer, queue_consumer) = if config.use_queue {
            let (p, c) = queue::bounded(config.queue_capacity);
            (Some(p), Some(c))
        } else {
            (None, None)
        };

        let backoff = config.backoff.clone();
        let gap_detection = config.gap_detection.clone();

        Arc::new(Self {
            transport,
            offline,
            book_engine: Mutex::new(BookEngine::new()),
            sequence_tracker: Mutex::new(SequenceTracker::new(gap_detection)),
            backoff: Mutex::new(backoff),
            circuit_breaker: CircuitBreaker::new(Default::default()),
            rate_limiter,
            metrics: Metrics::new(),
            registry: SubscriptionRegistry::new(sink),
            strategies: StrategyEngine::new(),
            latest_ticker: RwLock::new(std::collections::HashMap::new()),
            latest_book: RwLock::new(std::collections::HashMap::new()),
            callbacks: RwLock::new(Callbacks::default()),
            queue_producer,
            queue_consumer,
            queue_cond: Arc::new((Mutex::new(()), Condvar::new())),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            config,
        })
    }

    // --- Callback registration -------------------------------------------------

    pub fn on_ticker(&self, f: impl Fn(&Ticker) + Send + Sync + 'static) {
        self.callbacks.write().on_ticker = Some(Arc::new(f));
    }

    pub fn on_trade(&self, f: impl Fn(&Trade) + Send + Sync + 'static) {
        self.callbacks.write().on_trade = Some(Arc::new(f));
    }

    pub fn on_book(&self, f: impl Fn(&OrderBook) + Send + Sync + 'static) {
        self.callbacks.write().on_book = Some(Arc::new(f));
    }

    pub fn on_ohlc(&self, f: impl Fn(&Ohlc) + Send + Sync + 'static) {
        self.callbacks.write().on_ohlc = Some(Arc::new(f));
    }

    pub fn on_order(&self, f: impl Fn(&Order) + Send + Sync + 'static) {
        self.callbacks.write().on_order = Some(Arc::new(f));
    }

    pub fn on_own_trade(&self, f: impl Fn(&OwnTrade) + Send + Sync + 'static) {
        self.callbacks.write().on_own_trade = Some(Arc::new(f));
    }

    pub fn on_balance(&self, f: impl Fn(&Balance) + Send + Sync + 'static) {
        self.callbacks.write().on_balance = Some(Arc::new(f));
    }

    pub fn on_subscribed(&self, f: impl Fn(&SubscriptionAck) + Send + Sync + 'static) {
        self.callbacks.write().on_subscribed = Some(Arc::new(f));
    }

    pub fn on_unsubscribed(&self, f: impl Fn(&SubscriptionAck) + Send + Sync + 'static) {
        self.callbacks.write().on_unsubscribed = Some(Arc::new(f));
    }

    pub fn on_error(&self, f: impl Fn(ErrorKind, &str) + Send + Sync + 'static) {
        self.callbacks.write().on_error = Some(Arc::new(f));
    }

    pub fn on_reconnect(&self, f: impl Fn(u32, Duration, &str) + Send + Sync + 'static) {
        self.callbacks.write().on_reconnect = Some(Arc::new(f));
    }

    pub fn on_alert(&self, f: impl Fn(&Alert) + Send + Sync + 'static) {
        self.callbacks.write().on_alert = Some(Arc::new(f));
    }

    pub fn on_gap(&self, f: impl Fn(&GapInfo) + Send + Sync + 'static) {
        self.callbacks.write().on_gap = Some(Arc::new(f));
    }

    /// `f(previous, new)`.
    pub fn on_state_change(&self, f: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static) {
        self.callbacks.write().on_state_change = Some(Arc::new(f));
    }

    // --- Subscriptions / strategies ---------------------------------------------

    pub fn subscribe(&self, channel: Channel, symbols: Vec<String>, depth: u32) -> Subscription {
        self.registry.subscribe(channel, symbols, depth)
    }

    pub fn add_strategy(&self, strategy: Box<dyn AlertStrategy>) -> u64 {
        self.strategies.register(strategy)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.metrics.connection_state()
    }

    fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.metrics.connection_state();
        if previous == state {
            return;
        }
        self.set_connection_state(state);
        let cb = self.callbacks.read().on_state_change.clone();
        if let Some(cb) = cb {
            safe_invoke(self, "on_state_change", || cb(previous, state));
        }
    }

    fn emit_error(&self, kind: ErrorKind, message: &str) {
        let cb = self.callbacks.read().on_error.clone();
        if let Some(cb) = cb {
            // Bypasses safe_invoke: invoking the error callback through the
            // panic wrapper would re-enter emit_error on its own panic.
            cb(kind, message);
        }
    }

    // --- Lifecycle ---------------------------------------------------------------

    /// Connects (propagating failure), replays pending subscriptions, starts
    /// the I/O worker, and runs the dispatch loop on the calling thread (in
    /// queue mode) or simply waits for the I/O worker (direct mode).
    pub fn run(self: &Arc<Self>) -> Result<()> {
        if self.offline {
            return Ok(());
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_requested.store(false, Ordering::Release);

        self.connect()?;
        self.registry.replay_all();

        let io_handle = {
            let this = self.clone();
            std::thread::spawn(move || this.io_loop())
        };

        if self.queue_consumer.is_some() {
            self.dispatch_loop();
            let _ = io_handle.join();
        } else {
            let _ = io_handle.join();
        }

        Ok(())
    }

    /// Same as [`Runtime::run`] but both workers run in the background and
    /// this returns immediately.
    pub fn run_async(self: &Arc<Self>) -> Result<()> {
        if self.offline {
            return Ok(());
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_requested.store(false, Ordering::Release);

        self.connect()?;
        self.registry.replay_all();

        let io_runtime = self.clone();
        std::thread::spawn(move || io_runtime.io_loop());

        if self.queue_consumer.is_some() {
            let dispatch_runtime = self.clone();
            std::thread::spawn(move || dispatch_runtime.dispatch_loop());
        }

        Ok(())
    }

    /// Idempotent; safe to call from any thread, including a callback.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_requested.store(true, Ordering::Release);
        self.queue_cond.1.notify_all();
        if let Some(transport) = self.transport.read().clone() {
            transport.close();
        }
    }

    /// Feeds a pre-built event directly into the dispatch path, bypassing
    /// the transport. Used by [`Runtime::offline`] callers to replay
    /// recorded sessions. A `Book` event is always treated as a snapshot and
    /// validated against its own `checksum` field.
    pub fn inject_event(&self, event: Event) {
        let checksum_override = match &event {
            Event::Book(book) => Some(book.checksum),
            _ => None,
        };
        self.route(event, Instant::now(), checksum_override, true);
    }

    // --- Connect / reconnect -----------------------------------------------------

    fn connect(&self) -> Result<()> {
        self.set_connection_state(ConnectionState::Connecting);
        let transport = Transport::connect(&self.config.url, &self.config.timeouts, &self.config.tls)?;
        *self.transport.write() = Some(Arc::new(transport));
        self.set_connection_state(ConnectionState::Connected);
        Ok(())
    }

    fn reconnect_loop(&self) -> bool {
        self.set_connection_state(ConnectionState::Reconnecting);

        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                return false;
            }

            if !self.circuit_breaker.can_attempt() {
                std::thread::sleep(Duration::from_millis(200));
                continue;
            }

            let mut backoff = self.backoff.lock().unwrap();
            if backoff.should_stop() {
                drop(backoff);
                self.set_connection_state(ConnectionState::Disconnected);
                return false;
            }
            let attempt = backoff.current_attempt();
            let delay = backoff.next_delay();
            drop(backoff);

            let cb = self.callbacks.read().on_reconnect.clone();
            if let Some(cb) = cb {
                safe_invoke(self, "on_reconnect", || cb(attempt, delay, "connection lost"));
            }

            let deadline = Instant::now() + delay;
            while Instant::now() < deadline {
                if self.stop_requested.load(Ordering::Acquire) {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(50).min(deadline - Instant::now()));
            }

            self.metrics.record_reconnect_attempt();
            match Transport::connect(&self.config.url, &self.config.timeouts, &self.config.tls) {
                Ok(transport) => {
                    *self.transport.write() = Some(Arc::new(transport));
                    self.backoff.lock().unwrap().reset();
                    self.sequence_tracker.lock().unwrap().reset_all();
                    self.circuit_breaker.reset();
                    self.set_connection_state(ConnectionState::Connected);
                    self.registry.replay_all();
                    return true;
                }
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    self.emit_error(ErrorKind::ConnectionFailed, &e.to_string());
                }
            }
        }
    }

    // --- I/O worker ----------------------------------------------------------

    fn io_loop(self: Arc<Self>) {
        loop {
            if self.stop_requested.load(Ordering::Acquire) {
                break;
            }

            let transport = match self.transport.read().clone() {
                Some(t) if !t.is_closed() => t,
                _ => {
                    if !self.reconnect_loop() {
                        break;
                    }
                    continue;
                }
            };

            let receive_time = Instant::now();
            match transport.receive() {
                Ok(raw) => {
                    self.metrics.record_message_received();
                    self.handle_frame(&raw, receive_time);
                }
                Err(e) => {
                    if self.stop_requested.load(Ordering::Acquire) {
                        break;
                    }
                    self.emit_error(e.kind(), &e.to_string());
                    self.circuit_breaker.record_failure();
                    if let Some(t) = self.transport.read().clone() {
                        t.close();
                    }
                }
            }
        }
        self.set_connection_state(ConnectionState::Disconnected);
    }

    fn handle_frame(&self, raw: &str, receive_time: Instant) {
        let decoded = parse_message(raw);

        if matches!(decoded.event, Event::Heartbeat) {
            self.metrics.record_heartbeat();
            return;
        }

        if let Event::Subscribed(ref ack) = decoded.event {
            if let Some(channel) = Channel::from_str(&ack.channel) {
                self.registry.confirm_subscribed(channel, &ack.symbols);
            }
            let cb = self.callbacks.read().on_subscribed.clone();
            if let Some(cb) = cb {
                safe_invoke(self, "on_subscribed", || cb(ack));
            }
            return;
        }

        if let Event::Unsubscribed(ref ack) = decoded.event {
            if let Some(channel) = Channel::from_str(&ack.channel) {
                self.registry.confirm_unsubscribed(channel, &ack.symbols);
            }
            let cb = self.callbacks.read().on_unsubscribed.clone();
            if let Some(cb) = cb {
                safe_invoke(self, "on_unsubscribed", || cb(ack));
            }
            return;
        }

        if let Some(producer) = &self.queue_producer {
            let queued = QueuedEvent {
                event: decoded.event,
                receive_time,
                sequence: decoded.sequence,
                book_is_snapshot: decoded.book_is_snapshot,
                book_checksum: decoded.book_checksum,
            };
            match producer.try_push(queued) {
                Ok(()) => {
                    self.metrics.set_queue_depth(producer.len() as u64);
                    let (lock, cvar) = &*self.queue_cond;
                    let _guard = lock.lock().unwrap();
                    cvar.notify_one();
                }
                Err(_) => {
                    self.metrics.record_message_dropped();
                    self.emit_error(ErrorKind::QueueOverflow, "event queue is full");
                }
            }
        } else {
            // Direct mode: gap-check then route inline on the I/O thread.
            self.gap_check(&decoded.event, decoded.sequence);
            self.route(
                decoded.event,
                receive_time,
                decoded.book_checksum,
                decoded.book_is_snapshot,
            );
        }
    }

    // --- Dispatch worker -------------------------------------------------------

    fn dispatch_loop(&self) {
        let Some(consumer) = &self.queue_consumer else {
            return;
        };

        loop {
            if let Some(queued) = consumer.pop() {
                self.metrics.set_queue_depth(consumer.len() as u64);
                self.gap_check(&queued.event, queued.sequence);
                let latency_us = queued.receive_time.elapsed().as_micros() as u64;
                self.metrics.record_latency_us(latency_us);
                self.route(
                    queued.event,
                    queued.receive_time,
                    queued.book_checksum,
                    queued.book_is_snapshot,
                );
                self.metrics.record_message_processed();
                continue;
            }

            if self.stop_requested.load(Ordering::Acquire) {
                break;
            }

            let (lock, cvar) = &*self.queue_cond;
            let guard = lock.lock().unwrap();
            let _ = cvar.wait_timeout(guard, Duration::from_millis(100));
        }
    }

    fn gap_check(&self, event: &Event, sequence: Option<u64>) {
        let (Some(channel), Some(symbol), Some(sequence)) =
            (event.channel(), event.symbol(), sequence)
        else {
            return;
        };

        let gap = self
            .sequence_tracker
            .lock()
            .unwrap()
            .check(channel.as_str(), symbol, sequence);

        let Some(gap) = gap else {
            return;
        };

        self.metrics.record_gap_detected();

        let cb = self.callbacks.read().on_gap.clone();
        if let Some(cb) = cb {
            safe_invoke(self, "on_gap", || cb(&gap));
        }

        let recovery = self.sequence_tracker.lock().unwrap().recovery_action();
        match recovery {
            // `Callback` defers entirely to `on_gap`, already invoked above.
            GapRecoveryAction::Ignore | GapRecoveryAction::Callback => {}
            GapRecoveryAction::Reconnect => {
                if let Some(t) = self.transport.read().clone() {
                    t.close();
                }
            }
            GapRecoveryAction::Snapshot => {
                self.registry.replay_all();
            }
        }
    }

    // --- Routing -----------------------------------------------------------------

    fn route(
        &self,
        event: Event,
        _receive_time: Instant,
        checksum_override: Option<u32>,
        book_is_snapshot: bool,
    ) {
        match event {
            Event::Ticker(ticker) => {
                self.latest_ticker
                    .write()
                    .insert(ticker.symbol.clone(), ticker.clone());

                let cb = self.callbacks.read().on_ticker.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_ticker", || cb(&ticker));
                }

                let book = self.latest_book.read().get(&ticker.symbol).cloned();
                let (mut alerts, mut panics) = self.strategies.evaluate_ticker(&ticker);
                if let Some(book) = book {
                    let (more_alerts, more_panics) =
                        self.strategies.evaluate_ticker_and_book(&ticker, &book);
                    alerts.extend(more_alerts);
                    panics.extend(more_panics);
                }
                for message in panics {
                    self.emit_error(ErrorKind::CallbackError, &message);
                }
                self.dispatch_alerts(alerts);
            }
            Event::Book(book) => {
                let rendered = {
                    let mut engine = self.book_engine.lock().unwrap();
                    if book_is_snapshot {
                        engine.apply_snapshot(&book.symbol, &book.bids, &book.asks, checksum_override)
                    } else {
                        engine.apply_update(&book.symbol, &book.bids, &book.asks, checksum_override)
                    }
                };

                if !rendered.is_valid {
                    self.metrics.record_checksum_failure();
                    self.emit_error(
                        ErrorKind::ChecksumMismatch,
                        &format!("checksum mismatch for {}", rendered.symbol),
                    );
                }

                self.latest_book
                    .write()
                    .insert(rendered.symbol.clone(), rendered.clone());

                let cb = self.callbacks.read().on_book.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_book", || cb(&rendered));
                }

                let ticker = self.latest_ticker.read().get(&rendered.symbol).cloned();
                let (mut alerts, mut panics) = self.strategies.evaluate_book(&rendered);
                if let Some(ticker) = ticker {
                    let (more_alerts, more_panics) =
                        self.strategies.evaluate_ticker_and_book(&ticker, &rendered);
                    alerts.extend(more_alerts);
                    panics.extend(more_panics);
                }
                for message in panics {
                    self.emit_error(ErrorKind::CallbackError, &message);
                }
                self.dispatch_alerts(alerts);
            }
            Event::Trade(trade) => {
                let cb = self.callbacks.read().on_trade.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_trade", || cb(&trade));
                }
                let (alerts, panics) = self.strategies.evaluate_trade(&trade);
                for message in panics {
                    self.emit_error(ErrorKind::CallbackError, &message);
                }
                self.dispatch_alerts(alerts);
            }
            Event::Ohlc(ohlc) => {
                let cb = self.callbacks.read().on_ohlc.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_ohlc", || cb(&ohlc));
                }
                let (alerts, panics) = self.strategies.evaluate_ohlc(&ohlc);
                for message in panics {
                    self.emit_error(ErrorKind::CallbackError, &message);
                }
                self.dispatch_alerts(alerts);
            }
            Event::Order(order) => {
                let cb = self.callbacks.read().on_order.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_order", || cb(&order));
                }
            }
            Event::OwnTrade(trade) => {
                let cb = self.callbacks.read().on_own_trade.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_own_trade", || cb(&trade));
                }
            }
            Event::Balance(balance) => {
                let cb = self.callbacks.read().on_balance.clone();
                if let Some(cb) = cb {
                    safe_invoke(self, "on_balance", || cb(&balance));
                }
            }
            Event::Error(kind, message) => {
                self.emit_error(kind, &message);
            }
            Event::Subscribed(_) | Event::Unsubscribed(_) | Event::Heartbeat => {
                // Handled inline in handle_frame; never reach the queue.
            }
        }
    }

    fn dispatch_alerts(&self, alerts: Vec<Alert>) {
        if alerts.is_empty() {
            return;
        }
        let cb = self.callbacks.read().on_alert.clone();
        for alert in &alerts {
            self.metrics.record_alert_triggered();
            if let Some(cb) = &cb {
                safe_invoke(self, "on_alert", || cb(alert));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn offline_runtime() -> Arc<Runtime> {
        Runtime::offline(ClientConfig::new("wss://example.invalid/"))
    }

    #[test]
    fn offline_runtime_routes_injected_ticker_events() {
        let runtime = offline_runtime();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        runtime.on_ticker(move |_t| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        runtime.inject_event(Event::Ticker(Ticker {
            symbol: "BTC/USD".to_string(),
            bid: 100.0,
            ask: 101.0,
            last: 100.5,
            volume_24h: 10.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn offline_runtime_triggers_registered_strategy() {
        let runtime = offline_runtime();
        runtime.add_strategy(Box::new(
            crate::strategy::PriceAlert::builder("BTC/USD").above(100.0).build(),
        ));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        runtime.on_alert(move |_a| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        runtime.inject_event(Event::Ticker(Ticker {
            symbol: "BTC/USD".to_string(),
            bid: 150.0,
            ask: 151.0,
            last: 150.5,
            volume_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.metrics().alerts_triggered, 1);
    }

    #[test]
    fn panicking_callback_reports_error_instead_of_unwinding() {
        let runtime = offline_runtime();
        let error_seen = Arc::new(AtomicUsize::new(0));
        let error_seen_clone = error_seen.clone();
        runtime.on_error(move |kind, _msg| {
            if kind == ErrorKind::CallbackError {
                error_seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        runtime.on_ticker(|_t| panic!("boom"));

        runtime.inject_event(Event::Ticker(Ticker {
            symbol: "BTC/USD".to_string(),
            bid: 1.0,
            ask: 1.0,
            last: 1.0,
            volume_24h: 0.0,
            high_24h: 0.0,
            low_24h: 0.0,
            timestamp: String::new(),
        }));

        assert_eq!(error_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn checksum_mismatch_marks_book_invalid_and_reports_error() {
        let runtime = offline_runtime();
        let error_seen = Arc::new(AtomicUsize::new(0));
        let error_seen_clone = error_seen.clone();
        runtime.on_error(move |kind, _msg| {
            if kind == ErrorKind::ChecksumMismatch {
                error_seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        runtime.inject_event(Event::Book(OrderBook {
            symbol: "BTC/USD".to_string(),
            bids: vec![crate::types::PriceLevel {
                price: 100.0,
                quantity: 1.0,
            }],
            asks: vec![],
            is_valid: true,
            checksum: 0,
        }));

        assert_eq!(error_seen.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.metrics().checksum_failures, 1);
    }
}
