//! The process-wide owner of delivery state.
//!
//! [`DeliveryEngine`] holds the subscriber registry, the drone sessions and
//! the arm timers. It is built once at startup and shared by every handler.
//! Every status write, whether from arm, the arm timer, start or an override,
//! goes through one serialized transition that re-reads the stored status
//! before applying the rules in [`DeliveryStatus::apply`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use common::OrderId;
use domain::{DeliveryStatus, GeoPoint, Order, REFERENCE_POINT, StatusTrigger, Transition, pseudo_geocode};
use order_store::{OrderStore, StoreError};
use rand::Rng;
use saga::ProductCatalog;
use tokio::sync::{Mutex, RwLock};

use crate::broadcaster::{Broadcaster, Subscription};
use crate::error::{DeliveryError, Result};
use crate::events::{DroneEvent, OrderEvent};
use crate::route::{DEFAULT_SEGMENTS, Route};
use crate::session::DroneSession;
use crate::timer::ArmTimers;

/// Timings and switches for the simulation.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Lower bound of the random arm delay.
    pub arm_delay_min: Duration,
    /// Upper bound of the random arm delay.
    pub arm_delay_max: Duration,
    /// Pause between two position ticks.
    pub tick_interval: Duration,
    /// Route segments; the route has one more waypoint.
    pub segments: usize,
    /// Whether [`DeliveryEngine::force_status`] is allowed.
    pub allow_status_override: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            arm_delay_min: Duration::from_secs(20),
            arm_delay_max: Duration::from_secs(30),
            tick_interval: Duration::from_millis(500),
            segments: DEFAULT_SEGMENTS,
            allow_status_override: true,
        }
    }
}

impl DeliveryConfig {
    /// Picks a delay uniformly in `[arm_delay_min, arm_delay_max]`.
    fn arm_delay(&self) -> Duration {
        let min = self.arm_delay_min.as_millis() as u64;
        let max = self.arm_delay_max.as_millis() as u64;
        if max <= min {
            return self.arm_delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

struct Inner<S, C> {
    store: S,
    catalog: C,
    config: DeliveryConfig,
    broadcaster: Broadcaster,
    sessions: RwLock<HashMap<OrderId, DroneSession>>,
    timers: ArmTimers,
    transitions: Mutex<()>,
    next_run: AtomicU64,
    shutting_down: AtomicBool,
}

/// Drives arm, start, ticks, overrides and deletes for every order, and
/// publishes what happens to subscribers.
pub struct DeliveryEngine<S, C> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for DeliveryEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, C> DeliveryEngine<S, C>
where
    S: OrderStore + 'static,
    C: ProductCatalog + 'static,
{
    pub fn new(store: S, catalog: C, config: DeliveryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                catalog,
                config,
                broadcaster: Broadcaster::new(),
                sessions: RwLock::new(HashMap::new()),
                timers: ArmTimers::new(),
                transitions: Mutex::new(()),
                next_run: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.inner.config
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    /// Current drone session of an order, if a flight was started.
    pub async fn session(&self, order_id: OrderId) -> Option<DroneSession> {
        self.inner.sessions.read().await.get(&order_id).cloned()
    }

    /// Returns true if an arm timer is pending for the order.
    pub async fn arm_pending(&self, order_id: OrderId) -> bool {
        self.inner.timers.is_pending(order_id).await
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.inner
            .store
            .get(order_id)
            .await?
            .ok_or(DeliveryError::NotFound(order_id))
    }

    /// Applies `trigger` to the stored status and persists the result.
    ///
    /// Serialized across all callers. A changed status is broadcast.
    async fn transition(&self, order_id: OrderId, trigger: StatusTrigger) -> Result<Order> {
        let _serial = self.inner.transitions.lock().await;

        let order = self.load(order_id).await?;
        let current = order.status();

        match current.apply(trigger)? {
            Transition::Unchanged => {
                tracing::debug!(%order_id, status = current.as_str(), trigger = trigger.as_str(), "status unchanged");
                Ok(order)
            }
            Transition::Changed(next) => {
                let updated = self
                    .inner
                    .store
                    .set_status(order_id, next)
                    .await
                    .map_err(|e| match e {
                        StoreError::NotFound(id) => DeliveryError::NotFound(id),
                        other => DeliveryError::Store(other),
                    })?;
                tracing::info!(
                    %order_id,
                    from = current.as_str(),
                    to = next.as_str(),
                    trigger = trigger.as_str(),
                    "status changed"
                );
                self.inner
                    .broadcaster
                    .broadcast(order_id, OrderEvent::status(&updated));
                Ok(updated)
            }
        }
    }

    /// Arms the drone.
    ///
    /// Past pickup this is a no-op returning the order as is. Otherwise the
    /// order moves to "pickup started" and a timer is (re)scheduled that
    /// moves it to "preparing for delivery" unless it has taken off by then.
    #[tracing::instrument(skip(self))]
    pub async fn arm(&self, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if order.status().is_past_pickup() {
            tracing::debug!(%order_id, status = order.status().as_str(), "arm ignored");
            return Ok(order);
        }

        let order = self.transition(order_id, StatusTrigger::Arm).await?;

        let delay = self.inner.config.arm_delay();
        let engine = self.clone();
        self.inner
            .timers
            .schedule(order_id, delay, move || async move {
                engine.arm_timer_elapsed(order_id).await;
            })
            .await;

        tracing::info!(%order_id, delay_ms = delay.as_millis() as u64, "drone armed");
        Ok(order)
    }

    async fn arm_timer_elapsed(&self, order_id: OrderId) {
        match self
            .transition(order_id, StatusTrigger::ArmTimerElapsed)
            .await
        {
            Ok(order) => {
                tracing::debug!(%order_id, status = order.status().as_str(), "arm timer handled");
            }
            Err(DeliveryError::NotFound(_)) => {
                tracing::debug!(%order_id, "arm timer fired for a deleted order");
            }
            Err(error) => {
                tracing::error!(%order_id, error = %error, "arm timer transition failed");
            }
        }
    }

    /// Starts the drone.
    ///
    /// Cancels any pending arm timer, computes and broadcasts the route, sets
    /// "delivering by drone" and spawns the tick loop. Starting again replaces
    /// the flight. Fails for an order already delivered.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, order_id: OrderId) -> Result<()> {
        if self.inner.timers.cancel(order_id).await {
            tracing::debug!(%order_id, "pending arm timer cancelled by start");
        }

        let order = self.load(order_id).await?;
        order.status().apply(StatusTrigger::Start)?;

        let origin = self.resolve_origin(&order).await;
        let destination = order.delivery_destination().unwrap_or_else(|| {
            pseudo_geocode(order.shipping().address.as_deref().unwrap_or_default())
        });
        let route = Route::straight(origin, destination, self.inner.config.segments);

        let run_id = self.inner.next_run.fetch_add(1, Ordering::Relaxed);
        let route_event = OrderEvent::Drone(DroneEvent::route(&route));
        self.inner
            .sessions
            .write()
            .await
            .insert(order_id, DroneSession::new(run_id, route));
        self.inner.broadcaster.broadcast(order_id, route_event);

        if let Err(error) = self.transition(order_id, StatusTrigger::Start).await {
            self.end_session(order_id, run_id).await;
            return Err(error);
        }

        metrics::counter!("delivery_started_total").increment(1);
        tracing::info!(%order_id, run_id, "drone started");

        let engine = self.clone();
        tokio::spawn(async move { engine.fly(order_id, run_id).await });
        Ok(())
    }

    /// Restaurant of the first item's product, or the reference point.
    async fn resolve_origin(&self, order: &Order) -> GeoPoint {
        let Some(first) = order.items().first() else {
            return REFERENCE_POINT;
        };

        let restaurant_id = match self.inner.catalog.product(&first.product_id).await {
            Ok(product) => product.restaurant_id,
            Err(error) => {
                tracing::warn!(order_id = %order.id(), product_id = %first.product_id, error = %error, "product lookup failed, using reference point");
                return REFERENCE_POINT;
            }
        };

        let Some(restaurant_id) = restaurant_id else {
            return REFERENCE_POINT;
        };

        match self.inner.catalog.restaurant_location(&restaurant_id).await {
            Ok(location) => location,
            Err(error) => {
                tracing::warn!(order_id = %order.id(), %restaurant_id, error = %error, "restaurant lookup failed, using reference point");
                REFERENCE_POINT
            }
        }
    }

    /// Advances one waypoint per tick until the route is exhausted, then
    /// announces arrival. Stops early if the flight was replaced or removed.
    async fn fly(&self, order_id: OrderId, run_id: u64) {
        let tick = self.inner.config.tick_interval;
        let mut index = 0;

        loop {
            tokio::time::sleep(tick).await;

            let step = {
                let mut sessions = self.inner.sessions.write().await;
                match sessions.get_mut(&order_id) {
                    Some(session) if session.run_id() == run_id => {
                        match session.route().path().get(index).copied() {
                            Some(waypoint) => {
                                session.record_position(waypoint);
                                Some(Ok(waypoint))
                            }
                            None => Some(Err(session.route().end())),
                        }
                    }
                    _ => None,
                }
            };

            match step {
                Some(Ok(waypoint)) => {
                    self.inner.broadcaster.broadcast(
                        order_id,
                        OrderEvent::Drone(DroneEvent::position(&waypoint)),
                    );
                    index += 1;
                }
                Some(Err(end)) => {
                    self.inner
                        .broadcaster
                        .broadcast(order_id, OrderEvent::Drone(DroneEvent::arrived(end)));
                    metrics::counter!("delivery_arrived_total").increment(1);
                    tracing::info!(%order_id, run_id, "drone arrived");
                    return;
                }
                None => {
                    tracing::debug!(%order_id, run_id, "flight superseded, tick loop stopped");
                    return;
                }
            }
        }
    }

    async fn end_session(&self, order_id: OrderId, run_id: u64) {
        let mut sessions = self.inner.sessions.write().await;
        if sessions.get(&order_id).is_some_and(|s| s.run_id() == run_id) {
            sessions.remove(&order_id);
        }
    }

    /// Sets any known status, bypassing the transition graph.
    ///
    /// Refused when overrides are disabled by configuration.
    #[tracing::instrument(skip(self))]
    pub async fn force_status(&self, order_id: OrderId, status: DeliveryStatus) -> Result<Order> {
        if !self.inner.config.allow_status_override {
            tracing::warn!(%order_id, status = status.as_str(), "status override refused");
            return Err(DeliveryError::OverrideDisabled);
        }

        let order = self
            .transition(order_id, StatusTrigger::Override(status))
            .await?;
        tracing::warn!(%order_id, status = status.as_str(), "status forced by override");
        Ok(order)
    }

    /// Deletes an order, tells its subscribers and closes their streams.
    ///
    /// Returns false if the order did not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, order_id: OrderId) -> Result<bool> {
        let _serial = self.inner.transitions.lock().await;

        self.inner.timers.cancel(order_id).await;
        if !self.inner.store.delete(order_id).await? {
            return Ok(false);
        }
        self.inner.sessions.write().await.remove(&order_id);

        let broadcaster = &self.inner.broadcaster;
        broadcaster.broadcast(order_id, OrderEvent::Deleted { id: order_id });
        broadcaster.close(order_id);

        tracing::info!(%order_id, "order deleted");
        Ok(true)
    }

    /// Opens an event stream for an order.
    ///
    /// The stream starts with the stored status and, during a flight, the
    /// route and last position.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe(&self, order_id: OrderId) -> Result<Subscription> {
        // Hold the transition lock so no status change slips between the
        // read and the registration.
        let _serial = self.inner.transitions.lock().await;
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(DeliveryError::ShuttingDown);
        }

        let order = self.load(order_id).await?;
        let mut replay = vec![OrderEvent::status(&order)];
        if let Some(session) = self.inner.sessions.read().await.get(&order_id) {
            replay.extend(session.replay());
        }

        Ok(self.inner.broadcaster.subscribe(order_id, replay))
    }

    /// Ends every open event stream and refuses new ones.
    ///
    /// Open streams would otherwise hold their connections, and the server,
    /// open forever. Returns the number of streams closed.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> usize {
        let _serial = self.inner.transitions.lock().await;
        self.inner.shutting_down.store(true, Ordering::Release);

        let closed = self.inner.broadcaster.close_all();
        tracing::info!(closed, "event streams closed for shutdown");
        closed
    }
}
