//! Domain layer for the drone-delivery order service.
//!
//! This crate provides:
//! - The `Order` aggregate with its immutable line items and captured total
//! - `DeliveryStatus`, the closed set of delivery phases and the rules for
//!   moving between them
//! - Geo helpers: `GeoPoint`, linear interpolation and deterministic
//!   pseudo-geocoding of shipping addresses

pub mod geo;
pub mod order;

pub use geo::{GeoPoint, REFERENCE_POINT, pseudo_geocode};
pub use order::{
    ALL_STATUSES, DEFAULT_PAYMENT_METHOD, DeliveryStatus, Money, Order, OrderError, OrderItem,
    OrderRecord, PlaceOrder, ProductId, ShippingInfo, StatusTrigger, Transition,
};
