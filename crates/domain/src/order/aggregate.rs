//! Order aggregate implementation.

use chrono::{DateTime, SubsecRound, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, pseudo_geocode};

use super::{DeliveryStatus, Money, OrderError, OrderItem, ShippingInfo};

/// Timestamps are kept at microsecond precision, the resolution PostgreSQL
/// stores, so an order reads back exactly as it was written.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Payment method recorded when the client does not send one.
pub const DEFAULT_PAYMENT_METHOD: &str = "cod";

/// Everything needed to create an order once payment has succeeded.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub items: Vec<OrderItem>,
    pub user_email: Option<String>,
    pub shipping: ShippingInfo,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

/// Order aggregate root.
///
/// Line items and the total are fixed at creation. After that the only
/// mutation is the delivery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    items: Vec<OrderItem>,
    total: Money,
    status: DeliveryStatus,
    user_email: Option<String>,
    shipping: ShippingInfo,
    shipping_location: Option<GeoPoint>,
    payment_method: String,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Flat representation of a stored order, used by store implementations to
/// rebuild an [`Order`] from rows.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: OrderId,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub status: DeliveryStatus,
    pub user_email: Option<String>,
    pub shipping: ShippingInfo,
    pub shipping_location: Option<GeoPoint>,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in the initial delivery status.
    ///
    /// The total is the sum of the items' captured prices and the shipping
    /// location is pseudo-geocoded from the address when one is given.
    pub fn place(cmd: PlaceOrder) -> Result<Self, OrderError> {
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &cmd.items {
            if item.quantity == 0 || item.quantity > OrderItem::MAX_QUANTITY {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.cents() < 0 {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price,
                });
            }
        }

        let total = Self::total_of(&cmd.items)?;
        let shipping_location = cmd.shipping.address().map(pseudo_geocode);
        let payment_method = cmd
            .payment_method
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());
        let placed_at = now();

        Ok(Self {
            id: OrderId::new(),
            items: cmd.items,
            total,
            status: DeliveryStatus::default(),
            user_email: cmd.user_email.filter(|e| !e.trim().is_empty()),
            shipping: cmd.shipping,
            shipping_location,
            payment_method,
            transaction_id: cmd.transaction_id,
            created_at: placed_at,
            updated_at: placed_at,
        })
    }

    /// Sums quantity × unit price over `items` without overflowing.
    pub fn total_of(items: &[OrderItem]) -> Result<Money, OrderError> {
        items.iter().try_fold(Money::zero(), |total, item| {
            item.total_price()
                .and_then(|line| total.checked_add(line))
                .ok_or(OrderError::TotalOverflow)
        })
    }

    /// Rebuilds an order from its stored representation.
    pub fn from_record(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            items: record.items,
            total: record.total,
            status: record.status,
            user_email: record.user_email,
            shipping: record.shipping,
            shipping_location: record.shipping_location,
            payment_method: record.payment_method,
            transaction_id: record.transaction_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Sets the delivery status and bumps `updated_at`.
    ///
    /// Transition rules are not checked here; see [`DeliveryStatus::apply`].
    pub fn set_status(&mut self, status: DeliveryStatus) {
        self.status = status;
        self.updated_at = now();
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn shipping(&self) -> &ShippingInfo {
        &self.shipping
    }

    pub fn shipping_location(&self) -> Option<GeoPoint> {
        self.shipping_location
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Where the drone flies to: the stored coordinates, or a pseudo-geocode
    /// of the address when the coordinates were never derived.
    pub fn delivery_destination(&self) -> Option<GeoPoint> {
        self.shipping_location
            .or_else(|| self.shipping.address().map(pseudo_geocode))
    }
}
