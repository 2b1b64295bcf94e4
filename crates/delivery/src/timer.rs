//! Cancellable per-order arm timers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::OrderId;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

/// At most one pending delayed action per order.
///
/// Scheduling replaces (and cancels) the previous timer of the same order.
/// Cancelling drops the token; the timer task wakes and exits without
/// running its action.
#[derive(Debug, Clone, Default)]
pub struct ArmTimers {
    pending: Arc<Mutex<HashMap<OrderId, PendingTimer>>>,
    next_generation: Arc<AtomicU64>,
}

impl ArmTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay` unless cancelled or replaced first.
    pub async fn schedule<F, Fut>(&self, order_id: OrderId, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel, cancelled) = oneshot::channel();

        let replaced = self
            .pending
            .lock()
            .await
            .insert(order_id, PendingTimer { generation, cancel });
        if replaced.is_some() {
            tracing::debug!(%order_id, "previous arm timer cancelled");
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut pending = pending.lock().await;
                        match pending.get(&order_id) {
                            Some(timer) if timer.generation == generation => {
                                pending.remove(&order_id);
                            }
                            // Superseded after the sleep finished.
                            _ => return,
                        }
                    }
                    tracing::debug!(%order_id, "arm timer fired");
                    action().await;
                }
                _ = cancelled => {
                    tracing::debug!(%order_id, "arm timer cancelled before firing");
                }
            }
        });

        tracing::debug!(%order_id, delay_ms = delay.as_millis() as u64, "arm timer scheduled");
    }

    /// Cancels the pending timer for `order_id`. Returns true if one existed.
    pub async fn cancel(&self, order_id: OrderId) -> bool {
        match self.pending.lock().await.remove(&order_id) {
            Some(timer) => {
                // The task may have just finished sleeping; a closed channel is fine.
                let _ = timer.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Returns true if a timer is pending for `order_id`.
    pub async fn is_pending(&self, order_id: OrderId) -> bool {
        self.pending.lock().await.contains_key(&order_id)
    }
}
