//! Delivery status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The delivery phase of an order.
///
/// Labels are serialized verbatim because clients match on them.
///
/// State transitions:
/// ```text
/// DispatchedToRestaurant ──arm──► PickupStarted ──timer──► PreparingForDelivery
///          │                            │                          │
///          └──────────────start─────────┴──────────────────────────┴──► DeliveringByDrone
///                                                                            │
///                                                         override ──► DeliveredToHome
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeliveryStatus {
    /// Initial state, set when the order is created.
    #[default]
    #[serde(rename = "drone dispatched to restaurant")]
    DispatchedToRestaurant,

    /// The drone has been armed and is collecting the food.
    #[serde(rename = "pickup started")]
    PickupStarted,

    /// The arm timer elapsed; the drone is waiting to take off.
    #[serde(rename = "preparing for delivery")]
    PreparingForDelivery,

    /// The drone is flying its route.
    #[serde(rename = "delivering by drone")]
    DeliveringByDrone,

    /// Hand-off confirmed (terminal state).
    #[serde(rename = "delivered to home")]
    DeliveredToHome,
}

/// Something that asks for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    /// `POST /drone/arm`.
    Arm,
    /// The pre-delivery timer scheduled by `Arm` fired.
    ArmTimerElapsed,
    /// `POST /drone/start`.
    Start,
    /// Administrative override; bypasses the graph entirely.
    Override(DeliveryStatus),
}

impl StatusTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTrigger::Arm => "arm",
            StatusTrigger::ArmTimerElapsed => "arm_timer_elapsed",
            StatusTrigger::Start => "start",
            StatusTrigger::Override(_) => "override",
        }
    }
}

/// Outcome of applying a trigger to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moves to a new value.
    Changed(DeliveryStatus),
    /// The trigger is a no-op in the current status.
    Unchanged,
}

pub const ALL_STATUSES: [DeliveryStatus; 5] = [
    DeliveryStatus::DispatchedToRestaurant,
    DeliveryStatus::PickupStarted,
    DeliveryStatus::PreparingForDelivery,
    DeliveryStatus::DeliveringByDrone,
    DeliveryStatus::DeliveredToHome,
];

impl DeliveryStatus {
    /// Returns the wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::DispatchedToRestaurant => "drone dispatched to restaurant",
            DeliveryStatus::PickupStarted => "pickup started",
            DeliveryStatus::PreparingForDelivery => "preparing for delivery",
            DeliveryStatus::DeliveringByDrone => "delivering by drone",
            DeliveryStatus::DeliveredToHome => "delivered to home",
        }
    }

    /// Returns true once the drone has left or the order was handed over.
    pub fn is_in_flight_or_done(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::DeliveringByDrone | DeliveryStatus::DeliveredToHome
        )
    }

    /// Returns true if arming is a no-op in this status.
    pub fn is_past_pickup(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::PreparingForDelivery
                | DeliveryStatus::DeliveringByDrone
                | DeliveryStatus::DeliveredToHome
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::DeliveredToHome)
    }

    /// Applies `trigger` to this status.
    ///
    /// This is the only place the transition rules live. Callers are expected
    /// to read the current persisted status, apply, and write back under a
    /// single lock.
    pub fn apply(self, trigger: StatusTrigger) -> Result<Transition, OrderError> {
        let next = match trigger {
            StatusTrigger::Override(target) => Some(target),
            StatusTrigger::Arm => match self {
                DeliveryStatus::DispatchedToRestaurant => Some(DeliveryStatus::PickupStarted),
                _ => None,
            },
            StatusTrigger::ArmTimerElapsed => {
                if self.is_in_flight_or_done() {
                    None
                } else {
                    Some(DeliveryStatus::PreparingForDelivery)
                }
            }
            StatusTrigger::Start => {
                if self.is_terminal() {
                    return Err(OrderError::InvalidTransition {
                        current: self,
                        trigger: trigger.as_str(),
                    });
                }
                Some(DeliveryStatus::DeliveringByDrone)
            }
        };

        Ok(match next {
            Some(status) if status != self => Transition::Changed(status),
            _ => Transition::Unchanged,
        })
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(OrderError::EmptyStatus);
        }
        ALL_STATUSES
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| OrderError::UnknownStatus(trimmed.to_string()))
    }
}
