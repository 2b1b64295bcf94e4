//! Collaborator traits with in-memory and HTTP implementations.

pub mod catalog;
pub mod http;
pub mod payment;

pub use catalog::{CatalogCall, InMemoryProductCatalog, ProductCatalog, ProductSnapshot};
pub use http::{CollaboratorClient, HttpPaymentGateway, HttpProductCatalog};
pub use payment::{InMemoryPaymentGateway, PaymentGateway, PaymentReceipt};
