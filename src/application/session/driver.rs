//! Driver room session: join a bus room and push location telemetry.
//!
//! Sits on top of [`TransportSession`]. The driver wrapper owns the role
//! and join context the transport layer deliberately does not keep, so it
//! is also the one that re-identifies and re-joins after a reconnect.

use std::sync::{Arc, Mutex, Weak};

use crate::domain::foundation::{BusId, DriverInfo, Role, Timestamp};
use crate::domain::protocol::ClientEvent;
use crate::domain::telemetry::{GeoPoint, LocationSample};

use super::error::RealtimeError;
use super::identify;
use super::topics::Topic;
use super::transport_session::TransportSession;

const POISONED: &str = "driver session lock poisoned";

#[derive(Debug, Clone)]
struct DriverCredentials {
    token: String,
    bus_id: BusId,
}

/// The one trip a driver session may run at a time.
#[derive(Debug, Clone)]
pub struct ActiveTrip {
    pub bus_id: BusId,
    pub driver_info: DriverInfo,
}

/// Driver-side view of the realtime session.
#[derive(Clone)]
pub struct DriverSession {
    shared: Arc<DriverShared>,
}

struct DriverShared {
    session: TransportSession,
    credentials: Mutex<Option<DriverCredentials>>,
    active_trip: Mutex<Option<ActiveTrip>>,
}

impl DriverSession {
    /// Wraps a transport session and wires up reconnect resumption.
    pub fn new(session: TransportSession) -> Self {
        let shared = Arc::new(DriverShared {
            session,
            credentials: Mutex::new(None),
            active_trip: Mutex::new(None),
        });

        let weak: Weak<DriverShared> = Arc::downgrade(&shared);
        shared.session.events().on(
            Topic::Reconnected,
            Arc::new(move |_event| {
                if let Some(shared) = weak.upgrade() {
                    tokio::spawn(resume_after_reconnect(shared));
                }
                Ok(())
            }),
        );

        Self { shared }
    }

    /// The underlying transport session.
    pub fn session(&self) -> &TransportSession {
        &self.shared.session
    }

    /// Connects and identifies as the driver of `bus_id`.
    ///
    /// The activation token is the short numeric one-time code from the
    /// bus-activation call, not the app's bearer auth token.
    pub async fn connect_as_driver(&self, token: &str, bus_id: &BusId) -> Result<(), RealtimeError> {
        self.shared.session.connect().await?;
        identify::identify_driver(&self.shared.session, token, bus_id).await?;
        *self.shared.credentials.lock().expect(POISONED) = Some(DriverCredentials {
            token: token.to_string(),
            bus_id: bus_id.clone(),
        });
        Ok(())
    }

    /// Announces this driver in the bus room.
    ///
    /// A session drives at most one bus: starting a second trip while one
    /// is active is rejected instead of silently overwriting state.
    pub fn join_as_driver(
        &self,
        bus_id: BusId,
        driver_info: DriverInfo,
    ) -> Result<(), RealtimeError> {
        self.ensure_driver()?;

        let mut active = self.shared.active_trip.lock().expect(POISONED);
        if let Some(trip) = active.as_ref() {
            return Err(RealtimeError::TripAlreadyActive {
                bus_id: trip.bus_id.clone(),
            });
        }

        self.shared.session.emit(ClientEvent::DriverJoin {
            bus_id: bus_id.clone(),
            driver_info: driver_info.clone(),
        })?;
        *active = Some(ActiveTrip {
            bus_id: bus_id.clone(),
            driver_info,
        });
        tracing::info!(bus_id = %bus_id, "driver joined bus room");
        Ok(())
    }

    /// Emits one location frame, stamped now. Fire-and-forget: no ack is
    /// awaited before the next sample may be sent, and the full sample is
    /// carried every time (last-write-wins, no deltas).
    ///
    /// Gating on trip progress is the trip controller's job; this only
    /// refuses when the session is not a connected, identified driver.
    pub fn send_location_update(
        &self,
        bus_id: &BusId,
        location: GeoPoint,
        speed_kmh: f64,
        heading_deg: f64,
    ) -> Result<(), RealtimeError> {
        self.ensure_driver()?;
        self.shared.session.emit(ClientEvent::DriverLocation {
            bus_id: bus_id.clone(),
            location,
            speed: speed_kmh,
            heading: heading_deg,
            timestamp: Timestamp::now(),
        })
    }

    /// Emits a normalized geolocation sample for `bus_id`.
    pub fn send_sample(&self, bus_id: &BusId, sample: &LocationSample) -> Result<(), RealtimeError> {
        self.send_location_update(bus_id, sample.point, sample.speed_kmh, sample.heading_deg)
    }

    /// Leaves the bus room; the counterpart of [`Self::join_as_driver`].
    pub fn go_offline(&self, bus_id: &BusId, reason: Option<&str>) -> Result<(), RealtimeError> {
        self.ensure_driver()?;
        self.shared.session.emit(ClientEvent::DriverOffline {
            bus_id: bus_id.clone(),
            reason: reason.map(str::to_string),
        })?;

        let mut active = self.shared.active_trip.lock().expect(POISONED);
        if active.as_ref().map(|trip| &trip.bus_id) == Some(bus_id) {
            *active = None;
        }
        tracing::info!(bus_id = %bus_id, "driver went offline");
        Ok(())
    }

    /// The trip currently in progress, if any.
    pub fn active_trip(&self) -> Option<ActiveTrip> {
        self.shared.active_trip.lock().expect(POISONED).clone()
    }

    fn ensure_driver(&self) -> Result<(), RealtimeError> {
        if !self.shared.session.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        match self.shared.session.role() {
            Some(Role::Driver) => Ok(()),
            _ => Err(RealtimeError::NotIdentified {
                required: Role::Driver,
            }),
        }
    }
}

/// Re-identifies and re-joins after the transport session reconnected.
/// The transport layer does not do this itself: role and join context
/// live up here.
async fn resume_after_reconnect(shared: Arc<DriverShared>) {
    let credentials = shared.credentials.lock().expect(POISONED).clone();
    let Some(credentials) = credentials else {
        return;
    };

    if let Err(error) =
        identify::identify_driver(&shared.session, &credentials.token, &credentials.bus_id).await
    {
        tracing::warn!(%error, "driver re-identification after reconnect failed");
        return;
    }

    let trip = shared.active_trip.lock().expect(POISONED).clone();
    if let Some(trip) = trip {
        let rejoin = shared.session.emit(ClientEvent::DriverJoin {
            bus_id: trip.bus_id.clone(),
            driver_info: trip.driver_info,
        });
        match rejoin {
            Ok(()) => tracing::info!(bus_id = %trip.bus_id, "driver re-joined after reconnect"),
            Err(error) => tracing::warn!(%error, "driver re-join after reconnect failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transport::ChannelConnector;
    use crate::config::RealtimeConfig;
    use crate::domain::protocol::ServerEvent;
    use crate::ports::TransportConnector;

    fn bus(id: &str) -> BusId {
        BusId::new(id).unwrap()
    }

    async fn identified_driver() -> (DriverSession, crate::adapters::transport::RelayEnd) {
        let (connector, relay) = ChannelConnector::single();
        let session = TransportSession::new(
            Arc::new(connector) as Arc<dyn TransportConnector>,
            RealtimeConfig::default(),
        );
        let driver = DriverSession::new(session);

        let connect = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.connect_as_driver("123456", &bus("BUS1")).await })
        };
        let _identify_frame = relay.recv().await;
        relay.send(ServerEvent::IdentifySuccess).await;
        connect.await.unwrap().unwrap();

        (driver, relay)
    }

    #[tokio::test]
    async fn join_requires_identification() {
        let (connector, _relay) = ChannelConnector::single();
        let session = TransportSession::new(
            Arc::new(connector) as Arc<dyn TransportConnector>,
            RealtimeConfig::default(),
        );
        session.connect().await.unwrap();
        let driver = DriverSession::new(session);

        let result = driver.join_as_driver(bus("BUS1"), DriverInfo::named("Asha"));
        assert!(matches!(
            result,
            Err(RealtimeError::NotIdentified {
                required: Role::Driver
            })
        ));
    }

    #[tokio::test]
    async fn join_emits_driver_join_frame() {
        let (driver, relay) = identified_driver().await;

        driver
            .join_as_driver(bus("BUS1"), DriverInfo::named("Asha"))
            .unwrap();

        let frame = relay.recv().await.unwrap();
        match frame {
            ClientEvent::DriverJoin {
                bus_id,
                driver_info,
            } => {
                assert_eq!(bus_id, bus("BUS1"));
                assert_eq!(driver_info.name, "Asha");
            }
            other => panic!("expected DriverJoin, got {other:?}"),
        }
        assert_eq!(driver.active_trip().unwrap().bus_id, bus("BUS1"));
    }

    #[tokio::test]
    async fn second_trip_is_rejected_while_one_is_active() {
        let (driver, _relay) = identified_driver().await;

        driver
            .join_as_driver(bus("BUS1"), DriverInfo::named("Asha"))
            .unwrap();
        let second = driver.join_as_driver(bus("BUS2"), DriverInfo::named("Asha"));

        match second {
            Err(RealtimeError::TripAlreadyActive { bus_id }) => assert_eq!(bus_id, bus("BUS1")),
            other => panic!("expected TripAlreadyActive, got {:?}", other.map(|_| ())),
        }
        // The original trip is untouched.
        assert_eq!(driver.active_trip().unwrap().bus_id, bus("BUS1"));
    }

    #[tokio::test]
    async fn location_update_carries_full_stamped_sample() {
        let (driver, relay) = identified_driver().await;
        driver
            .join_as_driver(bus("BUS1"), DriverInfo::named("Asha"))
            .unwrap();
        let _join = relay.recv().await;

        let before = Timestamp::now();
        driver
            .send_location_update(&bus("BUS1"), GeoPoint::new(28.7, 77.1), 36.0, 90.0)
            .unwrap();

        let frame = relay.recv().await.unwrap();
        match frame {
            ClientEvent::DriverLocation {
                bus_id,
                location,
                speed,
                heading,
                timestamp,
            } => {
                assert_eq!(bus_id, bus("BUS1"));
                assert_eq!(location.latitude, 28.7);
                assert_eq!(speed, 36.0);
                assert_eq!(heading, 90.0);
                assert!(!timestamp.is_before(&before));
            }
            other => panic!("expected DriverLocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn go_offline_clears_the_active_trip() {
        let (driver, relay) = identified_driver().await;
        driver
            .join_as_driver(bus("BUS1"), DriverInfo::named("Asha"))
            .unwrap();
        let _join = relay.recv().await;

        driver.go_offline(&bus("BUS1"), Some("shift over")).unwrap();

        let frame = relay.recv().await.unwrap();
        assert!(matches!(frame, ClientEvent::DriverOffline { .. }));
        assert!(driver.active_trip().is_none());

        // A new trip may start now.
        driver
            .join_as_driver(bus("BUS2"), DriverInfo::named("Asha"))
            .unwrap();
        assert_eq!(driver.active_trip().unwrap().bus_id, bus("BUS2"));
    }

    #[tokio::test]
    async fn sending_after_disconnect_fails_loudly() {
        let (driver, _relay) = identified_driver().await;
        driver.session().disconnect().await;

        let result =
            driver.send_location_update(&bus("BUS1"), GeoPoint::new(28.7, 77.1), 36.0, 90.0);
        assert!(matches!(result, Err(RealtimeError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn driver_reidentifies_and_rejoins_after_reconnect() {
        let (connector, relay) = ChannelConnector::renewing();
        let session = TransportSession::new(
            Arc::new(connector) as Arc<dyn TransportConnector>,
            RealtimeConfig::default(),
        );
        let driver = DriverSession::new(session);

        let connect = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.connect_as_driver("123456", &bus("BUS1")).await })
        };
        let _identify = relay.recv().await;
        relay.send(ServerEvent::IdentifySuccess).await;
        connect.await.unwrap().unwrap();
        driver
            .join_as_driver(bus("BUS1"), DriverInfo::named("Asha"))
            .unwrap();
        let _join = relay.recv().await;

        // Drop the transport; the session reconnects on attempt 1 and the
        // driver wrapper replays identify + join on the new connection.
        relay.close().await;

        let frame = relay.recv().await.unwrap();
        assert!(matches!(frame, ClientEvent::Identify { .. }));
        relay.send(ServerEvent::IdentifySuccess).await;

        let frame = relay.recv().await.unwrap();
        match frame {
            ClientEvent::DriverJoin { bus_id, .. } => assert_eq!(bus_id, bus("BUS1")),
            other => panic!("expected DriverJoin, got {other:?}"),
        }
        assert_eq!(driver.session().role(), Some(Role::Driver));
    }
}
