//! Telemetry payloads relayed between drivers and passengers.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BusId, Timestamp};

use super::GeoPoint;

/// A bus position broadcast to every passenger in the bus room.
///
/// Carries no sequence number: the most recently received update is
/// always treated as current truth (last-write-wins telemetry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusLocationUpdate {
    pub bus_id: BusId,
    pub location: GeoPoint,
    pub speed_kmh: f64,
    pub heading_deg: f64,
    pub timestamp: Timestamp,
    pub driver_info: BroadcastDriverInfo,
}

/// The slice of the driver profile passengers are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastDriverInfo {
    pub name: String,
}

/// Driver presence change for a bus room.
///
/// Emitted on join/leave transitions. Independent of location updates: a
/// passenger can hold a stale last-known location while the driver status
/// flips to offline, and the two facts must not be conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatusUpdate {
    pub bus_id: BusId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_info: Option<BroadcastDriverInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub timestamp: Timestamp,
}

/// Static route description for a bus, served as a snapshot to passengers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub route_name: String,
    pub stops: Vec<String>,
}

/// Route snapshot reply scoped to a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRoute {
    pub bus_id: BusId,
    pub route: RouteInfo,
    pub total_stops: usize,
}

impl BusRoute {
    /// Builds the snapshot for a route, deriving the stop count.
    pub fn new(bus_id: BusId, route: RouteInfo) -> Self {
        let total_stops = route.stops.len();
        Self {
            bus_id,
            route,
            total_stops,
        }
    }
}
