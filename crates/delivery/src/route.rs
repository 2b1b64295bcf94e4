//! Straight-line drone routes.

use domain::GeoPoint;
use serde::{Deserialize, Serialize};

/// Number of segments in a route; the route has one more waypoint than this.
pub const DEFAULT_SEGMENTS: usize = 60;

/// A point on a route with its progress fraction `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    pub t: f64,
}

impl Waypoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A route from a restaurant to a shipping destination.
///
/// No road routing: waypoints are evenly spaced on the straight line between
/// the two points, the first equal to `start` and the last equal to `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    start: GeoPoint,
    end: GeoPoint,
    path: Vec<Waypoint>,
}

impl Route {
    /// Interpolates `segments + 1` waypoints with `t = i / segments`.
    ///
    /// A segment count of zero is treated as one.
    pub fn straight(start: GeoPoint, end: GeoPoint, segments: usize) -> Self {
        let segments = segments.max(1);
        let path = (0..=segments)
            .map(|i| {
                let t = i as f64 / segments as f64;
                let point = start.lerp(&end, t);
                Waypoint {
                    lat: point.lat,
                    lng: point.lng,
                    t,
                }
            })
            .collect();

        Self { start, end, path }
    }

    pub fn start(&self) -> GeoPoint {
        self.start
    }

    pub fn end(&self) -> GeoPoint {
        self.end
    }

    pub fn path(&self) -> &[Waypoint] {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}
