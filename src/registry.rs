//! Subscription registry: tracks desired subscription state, matches server
//! acknowledgements back to the handle that requested them, and lets the
//! last surviving [`Subscription`] clone implicitly unsubscribe on drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::types::Channel;

/// Where the registry sends outbound subscribe/unsubscribe frames. The
/// runtime implements this over the live transport; tests use a recording
/// mock.
pub trait CommandSink: Send + Sync {
    fn send_subscribe(&self, channel: Channel, symbols: &[String], depth: u32);
    fn send_unsubscribe(&self, channel: Channel, symbols: &[String]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Paused,
    Unsubscribed,
}

struct Record {
    channel: Channel,
    symbols: Mutex<Vec<String>>,
    state: Mutex<SubscriptionState>,
    confirmed: AtomicBool,
    depth: u32,
}

struct SubscriptionInner {
    id: u64,
    record: Arc<Record>,
    registry: Weak<RegistryShared>,
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.drop_subscription(self.id);
        }
    }
}

/// A live subscription handle. Cloning shares the same underlying
/// subscription; it unsubscribes only once every clone has been dropped.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    fn registry(&self) -> Option<Arc<RegistryShared>> {
        self.inner.registry.upgrade()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn channel(&self) -> Channel {
        self.inner.record.channel
    }

    pub fn symbols(&self) -> Vec<String> {
        self.inner.record.symbols.lock().unwrap().clone()
    }

    pub fn is_active(&self) -> bool {
        *self.inner.record.state.lock().unwrap() == SubscriptionState::Active
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.record.state.lock().unwrap() == SubscriptionState::Paused
    }

    pub fn is_confirmed(&self) -> bool {
        self.inner.record.confirmed.load(Ordering::Acquire)
    }

    /// Unsubscribes on the wire but keeps the handle; [`Subscription::resume`]
    /// re-subscribes the same symbol set.
    pub fn pause(&self) {
        let Some(registry) = self.registry() else {
            return;
        };
        let record = &self.inner.record;
        *record.state.lock().unwrap() = SubscriptionState::Paused;
        record.confirmed.store(false, Ordering::Release);
        let symbols = record.symbols.lock().unwrap().clone();
        registry.sink.send_unsubscribe(record.channel, &symbols);
    }

    pub fn resume(&self) {
        let Some(registry) = self.registry() else {
            return;
        };
        let record = &self.inner.record;
        *record.state.lock().unwrap() = SubscriptionState::Active;
        let symbols = record.symbols.lock().unwrap().clone();
        registry.sink.send_subscribe(record.channel, &symbols, record.depth);
    }

    /// Permanently unsubscribes and invalidates this handle (and any clones).
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry() else {
            return;
        };
        registry.unsubscribe_record(self.inner.id);
    }

    pub fn add_symbols(&self, symbols: &[String]) {
        let Some(registry) = self.registry() else {
            return;
        };
        let record = &self.inner.record;
        {
            let mut current = record.symbols.lock().unwrap();
            for s in symbols {
                if !current.contains(s) {
                    current.push(s.clone());
                }
            }
        }
        if *record.state.lock().unwrap() == SubscriptionState::Active {
            registry.sink.send_subscribe(record.channel, symbols, record.depth);
        }
    }

    pub fn remove_symbols(&self, symbols: &[String]) {
        let Some(registry) = self.registry() else {
            return;
        };
        let record = &self.inner.record;
        {
            let mut current = record.symbols.lock().unwrap();
            current.retain(|s| !symbols.contains(s));
        }
        registry.sink.send_unsubscribe(record.channel, symbols);
    }
}

struct RegistryShared {
    sink: Arc<dyn CommandSink>,
    records: Mutex<HashMap<u64, Arc<Record>>>,
}

impl RegistryShared {
    fn drop_subscription(&self, id: u64) {
        let record = self.records.lock().unwrap().remove(&id);
        if let Some(record) = record {
            *record.state.lock().unwrap() = SubscriptionState::Unsubscribed;
            let symbols = record.symbols.lock().unwrap().clone();
            self.sink.send_unsubscribe(record.channel, &symbols);
        }
    }

    fn unsubscribe_record(&self, id: u64) {
        self.drop_subscription(id);
    }
}

/// Owns every live [`Subscription`] and routes inbound `Subscribed` /
/// `Unsubscribed` acknowledgements back to the record that requested them.
pub struct SubscriptionRegistry {
    shared: Arc<RegistryShared>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                sink,
                records: Mutex::new(HashMap::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, channel: Channel, symbols: Vec<String>, depth: u32) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(Record {
            channel,
            symbols: Mutex::new(symbols.clone()),
            state: Mutex::new(SubscriptionState::Active),
            confirmed: AtomicBool::new(false),
            depth,
        });
        self.shared.records.lock().unwrap().insert(id, record.clone());
        self.shared.sink.send_subscribe(channel, &symbols, depth);

        Subscription {
            inner: Arc::new(SubscriptionInner {
                id,
                record,
                registry: Arc::downgrade(&self.shared),
            }),
        }
    }

    /// Marks every active, unconfirmed record on `channel` whose symbol set
    /// exactly matches `ack_symbols` as confirmed.
    pub fn confirm_subscribed(&self, channel: Channel, ack_symbols: &[String]) {
        let records = self.shared.records.lock().unwrap();
        for record in records.values() {
            if record.channel != channel {
                continue;
            }
            let symbols = record.symbols.lock().unwrap();
            if symbols_match(&symbols, ack_symbols) {
                record.confirmed.store(true, Ordering::Release);
            }
        }
    }

    pub fn confirm_unsubscribed(&self, channel: Channel, ack_symbols: &[String]) {
        let records = self.shared.records.lock().unwrap();
        for record in records.values() {
            if record.channel != channel {
                continue;
            }
            let symbols = record.symbols.lock().unwrap();
            if symbols_match(&symbols, ack_symbols) {
                record.confirmed.store(false, Ordering::Release);
            }
        }
    }

    /// Re-sends subscribe frames for every still-active record, used after a
    /// reconnect to restore server-side subscription state.
    pub fn replay_all(&self) {
        let records = self.shared.records.lock().unwrap();
        for record in records.values() {
            if *record.state.lock().unwrap() == SubscriptionState::Active {
                record.confirmed.store(false, Ordering::Release);
                let symbols = record.symbols.lock().unwrap().clone();
                self.shared.sink.send_subscribe(record.channel, &symbols, record.depth);
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.shared
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| *r.state.lock().unwrap() == SubscriptionState::Active)
            .count()
    }
}

fn symbols_match(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a_sorted = a.to_vec();
    let mut b_sorted = b.to_vec();
    a_sorted.sort();
    b_sorted.sort();
    a_sorted == b_sorted
}
