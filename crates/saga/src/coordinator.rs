//! Saga coordinator for placing orders.

use std::collections::HashMap;
use std::time::Instant;

use domain::{Order, OrderItem, PlaceOrder, ProductId};
use order_store::OrderStore;

use crate::error::{Result, SagaError, ServiceError};
use crate::order_placement;
use crate::request::{OrderRequest, ValidLine};
use crate::reservation::Reservations;
use crate::services::{PaymentGateway, ProductCatalog};

/// Orchestrates order placement sagas.
///
/// The coordinator drives a 4-step saga (check stock → reserve stock →
/// charge payment → persist order). Stock decrements are compensated by
/// increments, in the order they were made, when any later step fails.
///
/// There is no two-phase commit: if payment succeeds and persisting the order
/// then fails, the charge stays captured and is logged with its transaction
/// id for manual reconciliation.
pub struct SagaCoordinator<S, C, P>
where
    S: OrderStore,
    C: ProductCatalog,
    P: PaymentGateway,
{
    store: S,
    catalog: C,
    payment: P,
}

impl<S, C, P> SagaCoordinator<S, C, P>
where
    S: OrderStore,
    C: ProductCatalog,
    P: PaymentGateway,
{
    /// Creates a new saga coordinator.
    pub fn new(store: S, catalog: C, payment: P) -> Self {
        Self {
            store,
            catalog,
            payment,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Places an order: reserves stock, charges payment and persists the order.
    ///
    /// Returns the persisted order in its initial delivery status. On failure
    /// no order exists and every reservation made has been restored
    /// (best effort).
    #[tracing::instrument(
        skip(self, request),
        fields(saga_type = order_placement::SAGA_TYPE, items = request.items.len())
    )]
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let result = self.run(request).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        match &result {
            Ok(order) => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(order_id = %order.id(), total = %order.total(), duration, "saga completed successfully");
            }
            Err(error) => {
                metrics::counter!("saga_failed", "reason" => error.kind()).increment(1);
                tracing::warn!(reason = error.kind(), error = %error, duration, "saga failed");
            }
        }

        result
    }

    async fn run(&self, request: OrderRequest) -> Result<Order> {
        let lines = request.validate()?;

        // 1. Price every line from the live catalog and check stock
        tracing::info!(step = order_placement::STEP_CHECK_STOCK, "saga step started");
        let items = self.price_lines(&lines).await?;
        let total = Order::total_of(&items)?;

        // 2. Reserve stock, one item at a time in request order
        tracing::info!(step = order_placement::STEP_RESERVE_STOCK, "saga step started");
        let mut reservations = Reservations::new();
        for item in &items {
            if let Err(source) = self.catalog.reserve(&item.product_id, item.quantity).await {
                self.compensate(reservations, order_placement::STEP_RESERVE_STOCK)
                    .await;
                return Err(SagaError::ReservationFailed {
                    product_id: item.product_id.clone(),
                    source,
                });
            }
            reservations.record(item.product_id.clone(), item.quantity);
        }

        // 3. Charge the accumulated total
        tracing::info!(step = order_placement::STEP_CHARGE_PAYMENT, %total, "saga step started");
        let receipt = match self.payment.charge(total).await {
            Ok(receipt) => receipt,
            Err(error) => {
                self.compensate(reservations, order_placement::STEP_CHARGE_PAYMENT)
                    .await;
                return Err(if error.is_refusal() {
                    SagaError::PaymentFailed(error)
                } else {
                    SagaError::PaymentUnavailable(error)
                });
            }
        };

        // 4. Persist the order
        tracing::info!(step = order_placement::STEP_PERSIST_ORDER, "saga step started");
        let transaction_id = receipt.transaction_id;
        let OrderRequest {
            shipping,
            user_email,
            payment,
            ..
        } = request;
        let placed = Order::place(PlaceOrder {
            items,
            user_email,
            shipping: shipping.unwrap_or_default(),
            payment_method: payment.and_then(|p| p.method),
            transaction_id: transaction_id.clone(),
        });

        let persisted = match placed {
            Ok(order) => self.store.insert(&order).await.map(|()| order).map_err(SagaError::from),
            Err(error) => Err(SagaError::from(error)),
        };

        match persisted {
            Ok(order) => Ok(order),
            Err(error) => {
                tracing::error!(
                    transaction_id = transaction_id.as_deref().unwrap_or("none"),
                    %total,
                    error = %error,
                    "payment captured but order was not persisted, manual reconciliation required"
                );
                self.compensate(reservations, order_placement::STEP_PERSIST_ORDER)
                    .await;
                Err(error)
            }
        }
    }

    /// Fetches live snapshots and builds priced items.
    ///
    /// Stock is checked against the quantity requested for a product across
    /// all lines, so a product listed twice cannot oversell.
    async fn price_lines(&self, lines: &[ValidLine]) -> Result<Vec<OrderItem>> {
        let mut requested: HashMap<&ProductId, u32> = HashMap::new();
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let snapshot = self
                .catalog
                .product(&line.product_id)
                .await
                .map_err(|error| match error {
                    ServiceError::NotFound { .. } => {
                        SagaError::ProductNotFound(line.product_id.clone())
                    }
                    other => SagaError::CatalogUnavailable(other),
                })?;

            let wanted = requested.entry(&line.product_id).or_insert(0);
            *wanted = wanted.saturating_add(line.quantity);
            if snapshot.stock < i64::from(*wanted) {
                return Err(SagaError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: *wanted,
                    available: snapshot.stock,
                });
            }

            items.push(OrderItem::new(
                line.product_id.clone(),
                line.quantity,
                snapshot.price,
            ));
        }

        Ok(items)
    }

    /// Restores every reservation made so far. Never fails.
    #[tracing::instrument(skip(self, reservations), fields(reservations = reservations.len()))]
    async fn compensate(&self, reservations: Reservations, failed_step: &str) {
        if reservations.is_empty() {
            return;
        }

        metrics::counter!("saga_compensations_total").increment(1);
        let report = reservations.release(&self.catalog).await;
        tracing::warn!(
            failed_step,
            restored = report.restored,
            failed = report.failed,
            "compensation finished"
        );
    }
}
