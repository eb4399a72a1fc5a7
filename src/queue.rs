//! A bounded single-producer/single-consumer handoff queue.
//!
//! The I/O thread is the sole producer, the dispatch thread the sole
//! consumer. Backed by [`crossbeam_queue::ArrayQueue`], which is MPMC rather
//! than SPSC internally, but the single-producer/single-consumer discipline
//! here is what lets `Producer`/`Consumer` stay thin wrappers with no
//! separate synchronization of their own.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

pub struct Producer<T> {
    inner: Arc<ArrayQueue<T>>,
}

pub struct Consumer<T> {
    inner: Arc<ArrayQueue<T>>,
}

/// Creates a bounded SPSC channel with room for `capacity` items.
pub fn bounded<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "queue capacity must be non-zero");
    let inner = Arc::new(ArrayQueue::new(capacity));
    (
        Producer {
            inner: inner.clone(),
        },
        Consumer { inner },
    )
}

impl<T> Producer<T> {
    /// Fails and returns the item back if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.inner.push(item)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}

impl<T> Consumer<T> {
    /// Removes and returns the oldest item, `None` if empty.
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_order_preserved() {
        let (producer, consumer) = bounded::<u32>(4);
        producer.try_push(1).unwrap();
        producer.try_push(2).unwrap();
        assert_eq!(consumer.pop(), Some(1));
        assert_eq!(consumer.pop(), Some(2));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn full_queue_rejects_push() {
        let (producer, consumer) = bounded::<u32>(2);
        producer.try_push(1).unwrap();
        producer.try_push(2).unwrap();
        assert_eq!(producer.try_push(3), Err(3));
        assert_eq!(consumer.pop(), Some(1));
        producer.try_push(3).unwrap();
        assert_eq!(consumer.pop(), Some(2));
    }

    #[test]
    fn len_tracks_occupancy() {
        let (producer, consumer) = bounded::<u32>(4);
        assert_eq!(producer.len(), 0);
        producer.try_push(1).unwrap();
        producer.try_push(2).unwrap();
        assert_eq!(producer.len(), 2);
        consumer.pop();
        assert_eq!(consumer.len(), 1);
    }

    #[test]
    fn drop_does_not_leak_unread_items() {
        use std::sync::Arc;
        let marker = Arc::new(());
        let (producer, consumer) = bounded::<Arc<()>>(4);
        producer.try_push(marker.clone()).unwrap();
        producer.try_push(marker.clone()).unwrap();
        assert_eq!(Arc::strong_count(&marker), 3);
        drop(producer);
        drop(consumer);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn concurrent_producer_consumer() {
        let (producer, consumer) = bounded::<u32>(16);
        let handle = std::thread::spawn(move || {
            for i in 0..1000u32 {
                loop {
                    if producer.try_push(i).is_ok() {
                        break;
                    }
                    std::thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            if let Some(v) = consumer.pop() {
                received.push(v);
            } else {
                std::thread::yield_now();
            }
        }
        handle.join().unwrap();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
