//! Delivery error types.

use common::OrderId;
use domain::OrderError;
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while driving an order's delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Order {0} not found")]
    NotFound(OrderId),

    /// Status override is switched off by configuration.
    #[error("Status override is disabled")]
    OverrideDisabled,

    /// The order's current status does not allow the operation.
    #[error("{0}")]
    Order(#[from] OrderError),

    /// The engine is shutting down and opens no new streams.
    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for delivery results.
pub type Result<T> = std::result::Result<T, DeliveryError>;
