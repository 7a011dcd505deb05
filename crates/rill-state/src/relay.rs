//! The hot multicast stream primitive.
//!
//! A [`Relay`] is a multicast subject: emission synchronously invokes every
//! active subscriber on the calling thread, in subscription order. A relay
//! built with [`Relay::replay_latest`] additionally buffers the most recent
//! emission and replays it to each new subscriber.
//!
//! Locks guard only registry and buffer bookkeeping and are never held
//! across subscriber callbacks, so subscribing, cancelling, and emitting
//! from inside a callback are all legal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared subscriber callback.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Entry {
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct RelayInner<T> {
    subscribers: Vec<Entry<T>>,
    latest: Option<T>,
}

/// A hot multicast stream of `T`.
pub struct Relay<T> {
    inner: Arc<Mutex<RelayInner<T>>>,
    replay: bool,
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Relay {
            inner: Arc::clone(&self.inner),
            replay: self.replay,
        }
    }
}

impl<T> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Relay<T> {
    /// Create a relay that delivers only emissions after subscription.
    pub fn new() -> Self {
        Relay {
            inner: Arc::new(Mutex::new(RelayInner {
                subscribers: Vec::new(),
                latest: None,
            })),
            replay: false,
        }
    }

    /// Create a relay that replays the latest emission to new subscribers.
    pub fn replay_latest() -> Self {
        Relay {
            replay: true,
            ..Self::new()
        }
    }

    /// The number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|entry| entry.active.load(Ordering::Acquire))
            .count()
    }
}

impl<T: Clone> Relay<T> {
    /// Emit a value to every active subscriber, synchronously.
    ///
    /// A subscriber cancelled mid-broadcast is skipped if it has not yet
    /// been visited in the current cycle.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Entry<T>> = {
            let mut inner = self.inner.lock().unwrap();
            if self.replay {
                inner.latest = Some(value.clone());
            }
            inner
                .subscribers
                .retain(|entry| entry.active.load(Ordering::Acquire));
            inner.subscribers.clone()
        };
        for entry in snapshot {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(value);
            }
        }
    }

    /// Attach a subscriber; see [`subscribe_callback`](Self::subscribe_callback).
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(f))
    }

    /// Attach an already-shared subscriber callback.
    ///
    /// On a replay relay the latest buffered value is delivered to the new
    /// subscriber before this call returns. Registration happens first, so
    /// an emission triggered from inside the replayed delivery still
    /// reaches the subscriber.
    pub(crate) fn subscribe_callback(&self, callback: Callback<T>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        let replayed = {
            let mut inner = self.inner.lock().unwrap();
            inner.subscribers.push(Entry {
                active: Arc::clone(&active),
                callback: Arc::clone(&callback),
            });
            if self.replay {
                inner.latest.clone()
            } else {
                None
            }
        };
        if let Some(value) = replayed {
            callback(&value);
        }
        Subscription { active }
    }
}

impl<T: Clone + Send + Sync + 'static> Relay<T> {
    /// A subscribe-only view of this relay.
    pub fn stream(&self) -> Stream<T> {
        let relay = self.clone();
        Stream::new(move |callback| relay.subscribe_callback(callback))
    }
}

/// Cancellation handle for a subscription.
///
/// Dropping the handle leaves the subscription attached; only
/// [`cancel`](Subscription::cancel) detaches it.
#[derive(Clone, Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Detach the subscriber. No further emissions reach it.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        !self.active.load(Ordering::Acquire)
    }
}

/// A subscribable stream of `T`.
///
/// Streams are cheap handles: each [`subscribe`](Stream::subscribe) attaches
/// an independent subscriber with its own delivery state (replay, dedup).
pub struct Stream<T> {
    attach: Arc<dyn Fn(Callback<T>) -> Subscription + Send + Sync>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Stream {
            attach: Arc::clone(&self.attach),
        }
    }
}

impl<T: 'static> Stream<T> {
    pub(crate) fn new<A>(attach: A) -> Self
    where
        A: Fn(Callback<T>) -> Subscription + Send + Sync + 'static,
    {
        Stream {
            attach: Arc::new(attach),
        }
    }

    /// Attach a subscriber to this stream.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        (self.attach)(Arc::new(f))
    }
}
