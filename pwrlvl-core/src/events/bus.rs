//! Fan-out event bus.
//!
//! The bus owns an append-only log bounded to the most recent `capacity` events and a set of
//! subscriber registrations. A registration holds only the sending half of the subscriber's
//! queue; the consuming half lives in the [`Subscription`] returned to the caller.
//!
//! Publication and subscription take the same lock, so a new subscriber's backfill and its
//! live feed meet exactly: nothing published in between is lost or duplicated.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::event::{Event, EventLevel};

/// Snapshot of the bus counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub dropped: u64,
    pub subscribers: usize,
    pub retained: usize,
}

/// Outcome of waiting on a subscription.
#[derive(Debug, PartialEq)]
pub enum Recv {
    Event(Event),
    Timeout,
    Closed,
}

struct Registration {
    sender: Sender<Event>,
    dropped: Arc<AtomicU64>,
}

struct BusInner {
    log: VecDeque<Event>,
    subscribers: HashMap<u64, Registration>,
    next_seq: u64,
}

/// Thread-safe event bus shared behind an `Arc`.
pub struct EventBus {
    inner: Mutex<BusInner>,
    capacity: usize,
    subscriber_capacity: usize,
    backfill: usize,
    next_subscriber: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// Creates a bus retaining `capacity` events, with per-subscriber queues of
    /// `subscriber_capacity` and a backfill of the last `backfill` events.
    pub fn new(capacity: usize, subscriber_capacity: usize, backfill: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            inner: Mutex::new(BusInner {
                log: VecDeque::with_capacity(capacity),
                subscribers: HashMap::new(),
                next_seq: 0,
            }),
            capacity,
            subscriber_capacity: subscriber_capacity.max(1),
            backfill,
            next_subscriber: AtomicU64::new(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an event without payload.
    pub fn publish(&self, level: EventLevel, message: impl Into<String>) -> Event {
        self.publish_event(level, message.into(), None)
    }

    /// Appends an event carrying a structured payload.
    pub fn publish_with(&self, level: EventLevel, message: impl Into<String>, payload: Value) -> Event {
        self.publish_event(level, message.into(), Some(payload))
    }

    fn publish_event(&self, level: EventLevel, message: String, payload: Option<Value>) -> Event {
        let mut disconnected = Vec::new();

        let event = {
            let mut inner = self.inner.lock();
            let event = Event::new(inner.next_seq, level, message, payload);
            inner.next_seq += 1;

            if inner.log.len() >= self.capacity {
                inner.log.pop_front();
            }
            inner.log.push_back(event.clone());

            for (id, registration) in inner.subscribers.iter() {
                match registration.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        registration.dropped.fetch_add(1, Ordering::Relaxed);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
            for id in &disconnected {
                inner.subscribers.remove(id);
            }
            event
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        if !disconnected.is_empty() {
            debug!(count = disconnected.len(), "Removed disconnected subscribers");
        }
        if level == EventLevel::Error {
            warn!(message = %event.message, "Operation error event");
        }
        event
    }

    /// Registers a new subscriber queue. The returned subscription carries the backfill
    /// (the last `backfill` log entries) captured atomically with the registration.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = channel::bounded(self.subscriber_capacity);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));

        let backfill = {
            let mut inner = self.inner.lock();
            inner.subscribers.insert(
                id,
                Registration {
                    sender,
                    dropped: dropped.clone(),
                },
            );
            let skip = inner.log.len().saturating_sub(self.backfill);
            inner.log.iter().skip(skip).cloned().collect()
        };

        debug!(subscriber = id, "Subscriber registered");
        Subscription {
            id,
            receiver,
            backfill,
            dropped,
            bus: Arc::downgrade(self),
        }
    }

    /// Removes a registration. Safe to call repeatedly.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.inner.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    pub fn is_subscribed(&self, id: u64) -> bool {
        self.inner.lock().subscribers.contains_key(&id)
    }

    /// Copy of the whole log, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.inner.lock().log.iter().cloned().collect()
    }

    /// Copy of the last `n` log entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<Event> {
        let inner = self.inner.lock();
        let skip = inner.log.len().saturating_sub(n);
        inner.log.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> BusStats {
        let inner = self.inner.lock();
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            subscribers: inner.subscribers.len(),
            retained: inner.log.len(),
        }
    }
}

/// Consumer side of one subscriber queue. Dropping it unregisters the queue.
pub struct Subscription {
    id: u64,
    receiver: Receiver<Event>,
    backfill: Vec<Event>,
    dropped: Arc<AtomicU64>,
    bus: Weak<EventBus>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The events to replay before live forwarding. Empty after the first call.
    pub fn take_backfill(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.backfill)
    }

    /// Waits up to `timeout` for the next live event.
    pub fn recv_timeout(&self, timeout: Duration) -> Recv {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Recv::Event(event),
            Err(RecvTimeoutError::Timeout) => Recv::Timeout,
            Err(RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Deliveries to this subscriber dropped because its queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
