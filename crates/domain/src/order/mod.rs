//! Order aggregate and related types.

mod aggregate;
mod status;
mod value_objects;

pub use aggregate::{DEFAULT_PAYMENT_METHOD, Order, OrderRecord, PlaceOrder};
pub use status::{ALL_STATUSES, DeliveryStatus, StatusTrigger, Transition};
pub use value_objects::{Money, OrderItem, ProductId, ShippingInfo};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity {quantity} for product {product_id} (must be between 1 and {max})", max = OrderItem::MAX_QUANTITY)]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// A captured unit price is negative.
    #[error("Invalid price {price} for product {product_id}")]
    InvalidPrice { product_id: String, price: Money },

    /// The order total does not fit in the money range.
    #[error("Order total is too large")]
    TotalOverflow,

    /// Status value is blank.
    #[error("Status must not be empty")]
    EmptyStatus,

    /// Status value is not one of the known delivery phases.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// The trigger is not allowed from the current status.
    #[error("Invalid status transition: cannot {trigger} from '{current}'")]
    InvalidTransition {
        current: DeliveryStatus,
        trigger: &'static str,
    },
}
