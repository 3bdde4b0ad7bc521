//! Location samples produced by the geolocation acquirer.
//!
//! Device sensors report speed in meters per second and heading in degrees,
//! and both can be absent or garbage (negative speed while stationary, NaN
//! heading from a cheap GPS chip). A [`LocationSample`] is only constructed
//! through [`LocationSample::from_raw`], which normalizes raw input so the
//! invariants `speed_kmh >= 0` and `heading_deg in [0, 360)` hold for every
//! sample in the system.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A raw position fix as delivered by a device position source.
///
/// Speed is meters per second and nullable; heading is degrees and
/// nullable. Nothing here is trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
}

/// A normalized location sample.
///
/// Ephemeral by design: samples are never persisted client-side, only the
/// most recent one matters (last-write-wins telemetry).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub point: GeoPoint,

    /// Speed over ground in km/h; always `>= 0`.
    pub speed_kmh: f64,

    /// Heading in degrees clockwise from north; always in `[0, 360)`.
    pub heading_deg: f64,

    pub captured_at: Timestamp,
}

const MPS_TO_KMH: f64 = 3.6;

impl LocationSample {
    /// Normalizes a raw device fix into a sample.
    ///
    /// - absent or non-finite speed defaults to 0; negative speed (a common
    ///   stationary-GPS artifact) clamps to 0; otherwise m/s becomes km/h
    /// - absent or non-finite heading defaults to 0; any finite value is
    ///   wrapped into `[0, 360)`
    pub fn from_raw(fix: RawFix, captured_at: Timestamp) -> Self {
        let speed_kmh = fix
            .speed_mps
            .filter(|v| v.is_finite())
            .map(|mps| (mps * MPS_TO_KMH).max(0.0))
            .unwrap_or(0.0);

        let heading_deg = fix
            .heading_deg
            .filter(|v| v.is_finite())
            .map(|deg| deg.rem_euclid(360.0))
            .unwrap_or(0.0);

        Self {
            point: GeoPoint::new(fix.latitude, fix.longitude),
            speed_kmh,
            heading_deg,
            captured_at,
        }
    }
}
