use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Bounded single-consumer queue that never blocks the producer.
///
/// When full, [EventQueue::push] evicts the oldest element and counts it as
/// dropped. After [EventQueue::close] the consumer still drains what is
/// queued before [EventQueue::recv] returns `None`.
pub struct EventQueue<T> {
    inner: ArrayQueue<T>,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(EventQueue {
            inner: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    /// Returns false once the queue is closed.
    pub fn push(&self, item: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self.inner.force_push(item).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        true
    }

    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(item) = self.inner.pop() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return self.inner.pop();
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
