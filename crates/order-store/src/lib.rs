//! Order persistence.
//!
//! [`OrderStore`] is the seam the saga and the delivery engine write through.
//! [`InMemoryOrderStore`] backs tests and single-process runs without a
//! database; [`PostgresOrderStore`] is the durable implementation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::OrderId;
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;
