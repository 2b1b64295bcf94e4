//! Per-order fan-out of [`OrderEvent`]s to live subscribers.
//!
//! ```text
//! Client                Broadcaster                  Engine
//!   │                        │                          │
//!   ├─ subscribe(order) ────>│                          │
//!   │<─ replay (status, ─────┤                          │
//!   │   route, position)     │                          │
//!   │                        │<── broadcast(order, ev) ─┤
//!   │<─ event ───────────────┤                          │
//!   │                        │                          │
//!   ├─ disconnect ──────────>│ (drop guard unsubscribes)│
//! ```
//!
//! Each subscriber owns an unbounded channel. A subscriber whose receiving
//! side is gone is pruned on the next broadcast; the others still get the
//! event.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use common::OrderId;
use futures_core::Stream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::events::OrderEvent;

type SubscriberMap = HashMap<OrderId, HashMap<u64, UnboundedSender<OrderEvent>>>;

/// Registry of open event streams, keyed by order.
///
/// Clones share the same registry. Locks are never held across an await, so
/// a dropped [`Subscription`] can unsubscribe synchronously.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<SubscriberMap>>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a stream for `order_id` that first yields `replay`, then every
    /// event broadcast for the order.
    ///
    /// Replay events are queued while the registry is locked, so no live
    /// event can overtake them.
    pub fn subscribe(&self, order_id: OrderId, replay: Vec<OrderEvent>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for event in replay {
            // The receiver is alive in this scope.
            let _ = tx.send(event);
        }
        subscribers.entry(order_id).or_default().insert(id, tx);
        drop(subscribers);

        metrics::counter!("sse_subscribers_total").increment(1);
        tracing::debug!(%order_id, subscriber = id, "subscriber added");

        Subscription {
            rx,
            _guard: SubscriptionGuard {
                broadcaster: self.clone(),
                order_id,
                id,
            },
        }
    }

    /// Sends `event` to every open subscriber of `order_id`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn broadcast(&self, order_id: OrderId, event: OrderEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(channels) = subscribers.get(&order_id) else {
                return 0;
            };
            for (id, tx) in channels {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            tracing::debug!(%order_id, pruned = dead.len(), "pruning closed subscribers");
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(channels) = subscribers.get_mut(&order_id) {
                for id in dead {
                    channels.remove(&id);
                }
                if channels.is_empty() {
                    subscribers.remove(&order_id);
                }
            }
        }

        tracing::trace!(%order_id, event = event.name(), delivered, "event broadcast");
        delivered
    }

    /// Drops every subscriber of `order_id`, ending their streams.
    pub fn close(&self, order_id: OrderId) -> usize {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&order_id)
            .map_or(0, |channels| channels.len());
        tracing::debug!(%order_id, removed, "subscribers closed");
        removed
    }

    /// Drops every subscriber of every order, ending all streams.
    pub fn close_all(&self) -> usize {
        let subscribers = std::mem::take(
            &mut *self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let removed = subscribers.values().map(HashMap::len).sum();
        tracing::debug!(orders = subscribers.len(), removed, "all subscribers closed");
        removed
    }

    /// Number of open subscribers for `order_id`.
    pub fn subscriber_count(&self, order_id: OrderId) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&order_id)
            .map_or(0, HashMap::len)
    }

    fn unsubscribe(&self, order_id: OrderId, id: u64) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(channels) = subscribers.get_mut(&order_id) {
            channels.remove(&id);
            if channels.is_empty() {
                subscribers.remove(&order_id);
            }
        }
        tracing::debug!(%order_id, subscriber = id, "subscriber removed");
    }
}

#[derive(Debug)]
struct SubscriptionGuard {
    broadcaster: Broadcaster,
    order_id: OrderId,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.order_id, self.id);
    }
}

/// A live event stream for one order.
///
/// Ends when the order is deleted or the engine shuts down. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<OrderEvent>,
    _guard: SubscriptionGuard,
}

impl Stream for Subscription {
    type Item = OrderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
