//! Tick Broadcaster
//!
//! Fans a single tick sequence out to any number of independent
//! subscribers. Each subscriber owns a bounded queue; a tick that does not
//! fit is dropped for that subscriber only, so a slow reader never stalls
//! the producer or its peers.
//!
//! # Lifecycle
//!
//! - [`Broadcaster::subscribe`] registers a queue and returns a
//!   [`Subscription`] stream. Dropping the subscription deregisters it.
//! - [`Broadcaster::run`] drains a [`FeedSource`] until cancellation and
//!   then calls [`Broadcaster::close_all`], which ends every live
//!   subscription after its queued ticks are consumed.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::FeedSource;
use crate::domain::tick::Tick;
use crate::infrastructure::metrics;

/// Default per-subscriber queue capacity.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1_024;

// =============================================================================
// Subscriber Identity
// =============================================================================

/// Unique identifier of one subscription, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Per-subscriber fan-out of ticks.
#[derive(Debug)]
pub struct Broadcaster {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Tick>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl Broadcaster {
    /// Create a broadcaster whose subscriber queues hold `capacity` ticks.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a broadcaster with [`DEFAULT_SUBSCRIBER_CAPACITY`].
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Register a new subscriber.
    ///
    /// The subscription only sees ticks broadcast after this call returns.
    /// Once the broadcaster is closed the returned stream is already ended.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);

        if !self.is_closed() {
            self.subscribers.insert(id, tx);
            // close_all may have swept the map between the check and insert
            if self.is_closed() {
                self.subscribers.remove(&id);
            }
        }

        let count = self.subscribers.len();
        metrics::set_subscribers(count);
        tracing::debug!(subscriber = %id, subscribers = count, "subscriber registered");

        Subscription {
            id,
            rx,
            owner: Arc::downgrade(self),
        }
    }

    /// Offer a tick to every live subscriber without waiting.
    ///
    /// Returns the number of subscribers the tick was queued for. Full queues
    /// drop the tick; queues whose reader is gone are removed.
    pub fn broadcast(&self, tick: &Tick) -> usize {
        let mut delivered = 0_usize;
        let mut dropped = 0_u64;
        let mut gone = Vec::new();

        for entry in &self.subscribers {
            match entry.value().try_send(tick.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Closed(_)) => gone.push(*entry.key()),
            }
        }

        if dropped > 0 {
            metrics::record_ticks_dropped(dropped);
            tracing::trace!(symbol = tick.symbol(), dropped, "subscriber queue full");
        }
        if !gone.is_empty() {
            for id in gone {
                self.subscribers.remove(&id);
            }
            metrics::set_subscribers(self.subscribers.len());
        }

        delivered
    }

    /// Drain `source` into every subscriber until cancelled or exhausted.
    ///
    /// All subscriptions are ended when this returns.
    pub async fn run(self: Arc<Self>, source: Arc<dyn FeedSource>, cancel: CancellationToken) {
        tracing::info!(source = source.name(), symbols = ?source.symbols(), "broadcaster started");
        let mut ticks = source.produce(cancel.clone());

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = ticks.next() => match next {
                    Some(tick) => {
                        self.broadcast(&tick);
                    }
                    None => {
                        tracing::warn!(source = source.name(), "feed source ended");
                        break;
                    }
                },
            }
        }

        self.close_all();
        tracing::info!(source = source.name(), "broadcaster stopped");
    }

    /// End every live subscription and reject new ones.
    ///
    /// Ticks already queued are still delivered before each stream ends.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let count = self.subscribers.len();
        self.subscribers.clear();
        metrics::set_subscribers(0);
        tracing::debug!(subscribers = count, "all subscriptions completed");
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether [`Broadcaster::close_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn deregister(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            let count = self.subscribers.len();
            metrics::set_subscribers(count);
            tracing::debug!(subscriber = %id, subscribers = count, "subscriber removed");
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receiving end of one subscriber queue.
///
/// Yields ticks in broadcast order and ends once the broadcaster closes.
/// Dropping it deregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Tick>,
    owner: Weak<Broadcaster>,
}

impl Subscription {
    /// Identifier of this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Stream for Subscription {
    type Item = Tick;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.deregister(self.id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
