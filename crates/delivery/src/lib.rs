//! Simulated drone delivery for placed orders.
//!
//! After the saga has persisted an order, this crate takes over:
//! - [`DeliveryEngine::arm`] moves the order to "pickup started" and schedules
//!   a cancellable timer that later moves it to "preparing for delivery"
//! - [`DeliveryEngine::start`] cancels that timer, computes a straight
//!   [`Route`] and flies it tick by tick
//! - [`Broadcaster`] pushes every status change and drone movement to the
//!   order's live subscribers, replaying the current state to late joiners

pub mod broadcaster;
pub mod engine;
pub mod error;
pub mod events;
pub mod route;
pub mod session;
pub mod timer;

pub use broadcaster::{Broadcaster, Subscription};
pub use engine::{DeliveryConfig, DeliveryEngine};
pub use error::{DeliveryError, Result};
pub use events::{DroneEvent, OrderEvent};
pub use route::{DEFAULT_SEGMENTS, Route, Waypoint};
pub use session::DroneSession;
pub use timer::ArmTimers;
