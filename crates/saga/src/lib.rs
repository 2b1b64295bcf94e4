//! Saga pattern implementation for order placement.
//!
//! This crate provides the Saga Pattern for placing an order across the
//! product and payment services with compensating actions on failure.
//!
//! The order placement saga follows these steps:
//! 1. Check live stock and price for every item
//! 2. Reserve stock, one item at a time
//! 3. Charge payment
//! 4. Persist the order
//!
//! If any step after the first reservation fails, every reservation made so
//! far is restored in the order it was made.

pub mod coordinator;
pub mod error;
pub mod order_placement;
pub mod request;
pub mod reservation;
pub mod retry;
pub mod services;

pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError, ServiceError};
pub use request::{LineRequest, OrderRequest, PaymentRequest, ValidLine};
pub use reservation::{ReleaseReport, Reservations};
pub use retry::{RetryPolicy, retry_linear};
pub use services::{
    CatalogCall, CollaboratorClient, HttpPaymentGateway, HttpProductCatalog,
    InMemoryPaymentGateway, InMemoryProductCatalog, PaymentGateway, PaymentReceipt,
    ProductCatalog, ProductSnapshot,
};
