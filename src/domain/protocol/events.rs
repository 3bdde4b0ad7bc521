//! Wire protocol between realtime clients and the relay.
//!
//! Every frame is a JSON object tagged by `type` with the event name.
//! Client and relay share these types, so encode/decode must round-trip.
//!
//! # Protocol
//!
//! ```text
//! client                                relay
//!   │  identify {driver|passenger}       │
//!   │───────────────────────────────────▶│
//!   │  identify:success / identify:error │
//!   │◀───────────────────────────────────│
//!   │  driver:join / passenger:join      │
//!   │───────────────────────────────────▶│
//!   │  driver:location ──▶ bus room ──▶ bus:location (fan-out)
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{BusId, DriverInfo, PassengerInfo, Timestamp};
use crate::domain::telemetry::{BusLocationUpdate, BusRoute, DriverStatusUpdate, GeoPoint};

/// Credential presented by the identification handshake.
///
/// The driver token is a short-lived numeric one-time code minted by the
/// out-of-band bus-activation call; it is consumed exactly once per
/// connection. Passengers present no proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IdentificationCredential {
    #[serde(rename_all = "camelCase")]
    Driver { token: String, bus_id: BusId },
    Passenger,
}

impl IdentificationCredential {
    /// The role this credential identifies as.
    pub fn role(&self) -> crate::domain::foundation::Role {
        match self {
            IdentificationCredential::Driver { .. } => crate::domain::foundation::Role::Driver,
            IdentificationCredential::Passenger => crate::domain::foundation::Role::Passenger,
        }
    }
}

/// All frames a client can send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// One-shot role declaration; always the first application frame.
    #[serde(rename = "identify")]
    Identify { credential: IdentificationCredential },

    /// Driver joins their bus room.
    #[serde(rename = "driver:join", rename_all = "camelCase")]
    DriverJoin {
        bus_id: BusId,
        driver_info: DriverInfo,
    },

    /// High-frequency location telemetry; fire-and-forget.
    #[serde(rename = "driver:location", rename_all = "camelCase")]
    DriverLocation {
        bus_id: BusId,
        location: GeoPoint,
        speed: f64,
        heading: f64,
        timestamp: Timestamp,
    },

    /// Driver leaves their bus room.
    #[serde(rename = "driver:offline", rename_all = "camelCase")]
    DriverOffline {
        bus_id: BusId,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Passenger starts tracking a bus.
    #[serde(rename = "passenger:join", rename_all = "camelCase")]
    PassengerJoin {
        bus_id: BusId,
        #[serde(skip_serializing_if = "Option::is_none")]
        passenger_info: Option<PassengerInfo>,
    },

    /// Passenger stops tracking a bus.
    #[serde(rename = "passenger:leave", rename_all = "camelCase")]
    PassengerLeave { bus_id: BusId },

    /// Snapshot request for the last known location of a bus.
    #[serde(rename = "passenger:location:request", rename_all = "camelCase")]
    PassengerLocationRequest { bus_id: BusId },

    /// Snapshot request for the route of a bus.
    #[serde(rename = "passenger:route:request", rename_all = "camelCase")]
    PassengerRouteRequest { bus_id: BusId },
}

/// All frames the relay can send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Identification accepted.
    #[serde(rename = "identify:success")]
    IdentifySuccess,

    /// Identification refused (bad role or token).
    #[serde(rename = "identify:error")]
    IdentifyError { message: String },

    /// Driver join acknowledged.
    #[serde(rename = "driver:joined", rename_all = "camelCase")]
    DriverJoined { bus_id: BusId },

    /// Room-level refusal for a driver operation.
    #[serde(rename = "driver:error")]
    DriverError { message: String },

    /// Location frame accepted by the relay.
    #[serde(rename = "driver:location:sent")]
    DriverLocationSent,

    /// Bus position broadcast to the room (and snapshot replies).
    #[serde(rename = "bus:location")]
    BusLocation(BusLocationUpdate),

    /// Driver came online in a room.
    #[serde(rename = "driver:online")]
    DriverOnline(DriverStatusUpdate),

    /// Driver went offline in a room.
    #[serde(rename = "driver:offline")]
    DriverWentOffline(DriverStatusUpdate),

    /// Passenger join confirmed.
    #[serde(rename = "passenger:joined", rename_all = "camelCase")]
    PassengerJoined { bus_id: BusId },

    /// Room-level refusal or failure for a passenger operation.
    #[serde(rename = "passenger:error", rename_all = "camelCase")]
    PassengerError {
        #[serde(skip_serializing_if = "Option::is_none")]
        bus_id: Option<BusId>,
        message: String,
    },

    /// Informational message scoped to a bus.
    #[serde(rename = "passenger:info", rename_all = "camelCase")]
    PassengerInfo { bus_id: BusId, message: String },

    /// Route snapshot reply.
    #[serde(rename = "bus:route")]
    BusRoute(BusRoute),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::{BroadcastDriverInfo, RouteInfo};

    fn bus() -> BusId {
        BusId::new("BUS1").unwrap()
    }

    #[test]
    fn driver_identify_serializes_with_nested_credential() {
        let event = ClientEvent::Identify {
            credential: IdentificationCredential::Driver {
                token: "123456".to_string(),
                bus_id: bus(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"identify""#));
        assert!(json.contains(r#""type":"driver""#));
        assert!(json.contains(r#""token":"123456""#));
        assert!(json.contains(r#""busId":"BUS1""#));
    }

    #[test]
    fn passenger_identify_carries_no_proof() {
        let event = ClientEvent::Identify {
            credential: IdentificationCredential::Passenger,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"passenger""#));
        assert!(!json.contains("token"));
    }

    #[test]
    fn driver_location_uses_exact_event_name() {
        let event = ClientEvent::DriverLocation {
            bus_id: bus(),
            location: GeoPoint::new(28.7, 77.1),
            speed: 10.0,
            heading: 90.0,
            timestamp: Timestamp::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"driver:location""#));
        assert!(json.contains(r#""latitude":28.7"#));
    }

    #[test]
    fn identify_success_is_a_bare_ack() {
        let json = serde_json::to_string(&ServerEvent::IdentifySuccess).unwrap();
        assert_eq!(json, r#"{"type":"identify:success"}"#);
    }

    #[test]
    fn bus_location_broadcast_flattens_update_fields() {
        let event = ServerEvent::BusLocation(BusLocationUpdate {
            bus_id: bus(),
            location: GeoPoint::new(28.7, 77.1),
            speed_kmh: 36.0,
            heading_deg: 90.0,
            timestamp: Timestamp::now(),
            driver_info: BroadcastDriverInfo {
                name: "Asha".to_string(),
            },
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"bus:location""#));
        assert!(json.contains(r#""busId":"BUS1""#));
        assert!(json.contains(r#""driverInfo""#));
    }

    #[test]
    fn client_events_round_trip() {
        let events = vec![
            ClientEvent::Identify {
                credential: IdentificationCredential::Passenger,
            },
            ClientEvent::DriverJoin {
                bus_id: bus(),
                driver_info: DriverInfo::named("Asha"),
            },
            ClientEvent::DriverOffline {
                bus_id: bus(),
                reason: Some("shift over".to_string()),
            },
            ClientEvent::PassengerJoin {
                bus_id: bus(),
                passenger_info: None,
            },
            ClientEvent::PassengerLeave { bus_id: bus() },
            ClientEvent::PassengerLocationRequest { bus_id: bus() },
            ClientEvent::PassengerRouteRequest { bus_id: bus() },
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: ClientEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn server_events_round_trip() {
        let events = vec![
            ServerEvent::IdentifySuccess,
            ServerEvent::IdentifyError {
                message: "invalid token".to_string(),
            },
            ServerEvent::DriverJoined { bus_id: bus() },
            ServerEvent::DriverLocationSent,
            ServerEvent::PassengerJoined { bus_id: bus() },
            ServerEvent::PassengerError {
                bus_id: Some(bus()),
                message: "not joined".to_string(),
            },
            ServerEvent::PassengerInfo {
                bus_id: bus(),
                message: "driver online".to_string(),
            },
            ServerEvent::BusRoute(BusRoute::new(
                bus(),
                RouteInfo {
                    route_name: "Ring Road Express".to_string(),
                    stops: vec!["Depot".into(), "Market".into()],
                },
            )),
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: ServerEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn unknown_event_type_fails_to_decode() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"type":"mystery:event"}"#);
        assert!(result.is_err());
    }
}
