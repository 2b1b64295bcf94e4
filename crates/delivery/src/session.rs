//! In-memory state of one simulated delivery.

use crate::events::{DroneEvent, OrderEvent};
use crate::route::{Route, Waypoint};

/// The route and last broadcast position of an order's current flight.
///
/// Replaced on every start and dropped when the order is deleted. Nothing
/// here survives a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneSession {
    run_id: u64,
    route: Route,
    last_position: Option<Waypoint>,
}

impl DroneSession {
    pub fn new(run_id: u64, route: Route) -> Self {
        Self {
            run_id,
            route,
            last_position: None,
        }
    }

    /// Identifies the flight; a tick loop only advances its own run.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn last_position(&self) -> Option<Waypoint> {
        self.last_position
    }

    pub fn record_position(&mut self, waypoint: Waypoint) {
        self.last_position = Some(waypoint);
    }

    /// Events a late subscriber needs to draw the current flight.
    pub fn replay(&self) -> Vec<OrderEvent> {
        let mut events = vec![OrderEvent::Drone(DroneEvent::route(&self.route))];
        if let Some(position) = &self.last_position {
            events.push(OrderEvent::Drone(DroneEvent::position(position)));
        }
        events
    }
}
