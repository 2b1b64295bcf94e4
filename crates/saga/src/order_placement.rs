//! Order placement saga constants.

/// The saga type identifier for order placement.
pub const SAGA_TYPE: &str = "OrderPlacement";

/// Step name: Look up live price and stock for every item.
pub const STEP_CHECK_STOCK: &str = "check_stock";

/// Step name: Decrement stock for every item, one at a time.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: Charge the accumulated total.
pub const STEP_CHARGE_PAYMENT: &str = "charge_payment";

/// Step name: Persist the order and its items.
pub const STEP_PERSIST_ORDER: &str = "persist_order";
