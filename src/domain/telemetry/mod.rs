//! Location telemetry value objects.

mod location;
mod updates;

pub use location::{GeoPoint, LocationSample, RawFix};
pub use updates::{
    BroadcastDriverInfo, BusLocationUpdate, BusRoute, DriverStatusUpdate, RouteInfo,
};
