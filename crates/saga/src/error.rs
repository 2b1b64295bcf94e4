//! Saga error types.

use domain::{OrderError, ProductId};
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by collaborator clients (product and payment services).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport failure or 5xx response; worth retrying.
    #[error("{method} {url} unavailable: {reason}")]
    Unavailable {
        method: &'static str,
        url: String,
        reason: String,
    },

    /// The collaborator answered 404.
    #[error("{method} {url} not found")]
    NotFound { method: &'static str, url: String },

    /// The collaborator refused the request (4xx or an error payload).
    #[error("{method} {url} rejected with status {status}: {body}")]
    Rejected {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The collaborator answered successfully but the body is unusable.
    #[error("{method} {url} returned an invalid response: {reason}")]
    InvalidResponse {
        method: &'static str,
        url: String,
        reason: String,
    },

    /// The payment service did not report success.
    #[error("Payment declined: {0}")]
    Declined(String),
}

impl ServiceError {
    /// Returns true if the call may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Unavailable { .. })
    }

    /// Returns true if the collaborator answered and refused, as opposed to
    /// being unreachable or answering something unusable.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ServiceError::Declined(_) | ServiceError::Rejected { .. } | ServiceError::NotFound { .. }
        )
    }
}

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed; nothing was attempted.
    #[error("{0}")]
    Validation(String),

    /// A requested product does not exist.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// Live stock cannot cover the requested quantity.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// The product service could not be reached while checking stock.
    #[error("Product service unavailable: {0}")]
    CatalogUnavailable(ServiceError),

    /// A stock decrement failed; earlier reservations were restored.
    #[error("Failed to reserve stock for product {product_id}: {source}")]
    ReservationFailed {
        product_id: ProductId,
        #[source]
        source: ServiceError,
    },

    /// The payment service refused the charge; all reservations were restored.
    #[error("Payment failed: {0}")]
    PaymentFailed(ServiceError),

    /// The payment service could not be reached or answered garbage; all
    /// reservations were restored.
    #[error("Payment service unavailable: {0}")]
    PaymentUnavailable(ServiceError),

    /// The order could not be built from the priced items.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The order store failed.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
}

impl SagaError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::ProductNotFound(_) => "product_not_found",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::CatalogUnavailable(_) => "catalog_unavailable",
            SagaError::ReservationFailed { .. } => "reservation_failed",
            SagaError::PaymentFailed(_) => "payment_failed",
            SagaError::PaymentUnavailable(_) => "payment_unavailable",
            SagaError::Order(_) => "order",
            SagaError::Store(_) => "store",
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
