//! Coordinates and the pseudo-geocoder.
//!
//! The service has no real geocoder. Shipping addresses are mapped onto a
//! small bounding box around [`REFERENCE_POINT`] with a stable string hash so
//! the same address always lands on the same spot. The result is plausible on
//! a map and repeatable in tests, but it is not a real location.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Point on the straight line from `self` to `other` at fraction `t`.
    ///
    /// `t = 0.0` yields `self` exactly and `t = 1.0` yields `other` exactly.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        if t >= 1.0 {
            return *other;
        }
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}

/// Fallback restaurant location and centre of the pseudo-geocoding box
/// (District 1, Ho Chi Minh City).
pub const REFERENCE_POINT: GeoPoint = GeoPoint::new(10.7769, 106.7009);

/// Full width/height of the pseudo-geocoding box in degrees (~11 km).
const SPREAD_DEGREES: f64 = 0.1;

/// 32-bit FNV-1a over the UTF-8 bytes of `input`.
fn stable_hash(input: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    input.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    })
}

/// Maps an address onto a deterministic point near [`REFERENCE_POINT`].
///
/// Leading/trailing whitespace and letter case are ignored so trivially
/// different spellings of one address agree.
pub fn pseudo_geocode(address: &str) -> GeoPoint {
    let normalized = address.trim().to_lowercase();
    let hash = stable_hash(&normalized);

    let lat_bits = f64::from(hash & 0xffff) / f64::from(0xffff_u32);
    let lng_bits = f64::from(hash >> 16) / f64::from(0xffff_u32);

    GeoPoint {
        lat: REFERENCE_POINT.lat + (lat_bits - 0.5) * SPREAD_DEGREES,
        lng: REFERENCE_POINT.lng + (lng_bits - 0.5) * SPREAD_DEGREES,
    }
}
