//! Events pushed to subscribers of an order.

use common::OrderId;
use domain::{DeliveryStatus, GeoPoint, Order};
use serde::Serialize;

use crate::route::{Route, Waypoint};

/// Drone movement, sent as the `drone` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DroneEvent {
    /// The full path, sent before the drone moves.
    Route {
        path: Vec<Waypoint>,
        start: GeoPoint,
        end: GeoPoint,
    },
    /// One tick along the path.
    Pos { lat: f64, lng: f64, progress: f64 },
    /// The last waypoint was reached. Does not change the order status.
    Arrived { lat: f64, lng: f64 },
}

impl DroneEvent {
    pub fn route(route: &Route) -> Self {
        DroneEvent::Route {
            path: route.path().to_vec(),
            start: route.start(),
            end: route.end(),
        }
    }

    pub fn position(waypoint: &Waypoint) -> Self {
        DroneEvent::Pos {
            lat: waypoint.lat,
            lng: waypoint.lng,
            progress: waypoint.t,
        }
    }

    pub fn arrived(at: GeoPoint) -> Self {
        DroneEvent::Arrived {
            lat: at.lat,
            lng: at.lng,
        }
    }
}

/// Everything a subscriber of one order can receive.
///
/// Serializes to the event's data payload; [`OrderEvent::name`] gives the
/// event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrderEvent {
    Status { id: OrderId, status: DeliveryStatus },
    Drone(DroneEvent),
    Deleted { id: OrderId },
}

impl OrderEvent {
    pub fn status(order: &Order) -> Self {
        OrderEvent::Status {
            id: order.id(),
            status: order.status(),
        }
    }

    /// The event name on the push stream.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Status { .. } => "status",
            OrderEvent::Drone(_) => "drone",
            OrderEvent::Deleted { .. } => "deleted",
        }
    }
}
