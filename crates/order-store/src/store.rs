use std::sync::Arc;

use async_trait::async_trait;
use domain::{DeliveryStatus, Order};

use crate::{OrderId, Result};

/// Core trait for order store implementations.
///
/// Orders are written once by the saga and afterwards only their status
/// changes. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with its line items.
    ///
    /// Fails with `AlreadyExists` if an order with the same id is stored.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders, newest first, optionally restricted to one user email.
    async fn list(&self, user_email: Option<&str>) -> Result<Vec<Order>>;

    /// Overwrites the delivery status and returns the updated order.
    ///
    /// No transition rules are enforced here; callers serialize status
    /// writes and decide what is allowed.
    async fn set_status(&self, id: OrderId, status: DeliveryStatus) -> Result<Order>;

    /// Deletes an order and its items. Returns false if it did not exist.
    async fn delete(&self, id: OrderId) -> Result<bool>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn insert(&self, order: &Order) -> Result<()> {
        (**self).insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get(id).await
    }

    async fn list(&self, user_email: Option<&str>) -> Result<Vec<Order>> {
        (**self).list(user_email).await
    }

    async fn set_status(&self, id: OrderId, status: DeliveryStatus) -> Result<Order> {
        (**self).set_status(id, status).await
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        (**self).delete(id).await
    }
}
