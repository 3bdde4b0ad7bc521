//! Per-connection protocol machine.
//!
//! Transport-agnostic: the WebSocket handler and the long-poll endpoints
//! both feed decoded [`ClientEvent`]s in and drain [`ServerEvent`]s from
//! the connection's outbox. Identification comes first; every room
//! operation before it, or under the wrong role, is answered with the
//! role-scoped error event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::domain::foundation::{BusId, Role, Timestamp};
use crate::domain::protocol::{ClientEvent, IdentificationCredential, ServerEvent};
use crate::domain::telemetry::{BroadcastDriverInfo, BusLocationUpdate, GeoPoint};
use crate::ports::ActivationTokenValidator;

use super::rooms::RoomRegistry;

/// State for one connected client, whatever the transport.
pub struct RelayConnection {
    registry: Arc<RoomRegistry>,
    tokens: Arc<dyn ActivationTokenValidator>,
    outbox: mpsc::UnboundedSender<ServerEvent>,
    role: Option<Role>,
    driver_room: Option<BusId>,
    driver_profile: Option<BroadcastDriverInfo>,
    subscriptions: HashMap<BusId, JoinHandle<()>>,
}

impl RelayConnection {
    pub fn new(
        registry: Arc<RoomRegistry>,
        tokens: Arc<dyn ActivationTokenValidator>,
        outbox: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            registry,
            tokens,
            outbox,
            role: None,
            driver_room: None,
            driver_profile: None,
            subscriptions: HashMap::new(),
        }
    }

    /// Processes one frame from the client.
    pub async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Identify { credential } => self.identify(credential).await,
            ClientEvent::DriverJoin {
                bus_id,
                driver_info,
            } => self.driver_join(bus_id, driver_info.name).await,
            ClientEvent::DriverLocation {
                bus_id,
                location,
                speed,
                heading,
                timestamp,
            } => {
                self.driver_location(bus_id, location, speed, heading, timestamp)
                    .await
            }
            ClientEvent::DriverOffline { bus_id, reason } => {
                self.driver_offline(bus_id, reason).await
            }
            ClientEvent::PassengerJoin { bus_id, .. } => self.passenger_join(bus_id).await,
            ClientEvent::PassengerLeave { bus_id } => self.passenger_leave(bus_id).await,
            ClientEvent::PassengerLocationRequest { bus_id } => {
                self.location_snapshot(bus_id).await
            }
            ClientEvent::PassengerRouteRequest { bus_id } => self.route_snapshot(bus_id).await,
        }
    }

    /// Tears the connection down: drops room subscriptions and, for a
    /// driver that vanished without an explicit offline, tells the room
    /// so passengers don't keep a phantom online driver.
    pub async fn close(&mut self) {
        for (_, forwarder) in self.subscriptions.drain() {
            forwarder.abort();
        }
        if let Some(bus_id) = self.driver_room.take() {
            tracing::info!(bus_id = %bus_id, "driver connection lost; marking offline");
            self.registry
                .driver_offline(&bus_id, Some("connection lost".to_string()))
                .await;
        }
    }

    async fn identify(&mut self, credential: IdentificationCredential) {
        if self.role.is_some() {
            self.reply(ServerEvent::IdentifyError {
                message: "already identified".to_string(),
            });
            return;
        }
        match credential {
            IdentificationCredential::Driver { token, bus_id } => {
                if self.tokens.consume(&token, &bus_id) {
                    self.role = Some(Role::Driver);
                    tracing::info!(bus_id = %bus_id, "driver identified");
                    self.reply(ServerEvent::IdentifySuccess);
                } else {
                    tracing::warn!(bus_id = %bus_id, "driver presented an invalid token");
                    self.reply(ServerEvent::IdentifyError {
                        message: "invalid token".to_string(),
                    });
                }
            }
            IdentificationCredential::Passenger => {
                // Best-effort identity: passengers are always accepted.
                self.role = Some(Role::Passenger);
                self.reply(ServerEvent::IdentifySuccess);
            }
        }
    }

    async fn driver_join(&mut self, bus_id: BusId, name: String) {
        if self.role != Some(Role::Driver) {
            self.reply(ServerEvent::DriverError {
                message: "identify as a driver first".to_string(),
            });
            return;
        }
        let profile = BroadcastDriverInfo { name };
        if !self
            .registry
            .try_claim_driver(&bus_id, profile.clone())
            .await
        {
            self.reply(ServerEvent::DriverError {
                message: format!("another driver is already active for bus {bus_id}"),
            });
            return;
        }
        self.driver_room = Some(bus_id.clone());
        self.driver_profile = Some(profile);
        self.reply(ServerEvent::DriverJoined { bus_id });
    }

    async fn driver_location(
        &mut self,
        bus_id: BusId,
        location: GeoPoint,
        speed: f64,
        heading: f64,
        timestamp: Timestamp,
    ) {
        if self.role != Some(Role::Driver) || self.driver_room.as_ref() != Some(&bus_id) {
            self.reply(ServerEvent::DriverError {
                message: "join the bus before sending locations".to_string(),
            });
            return;
        }
        let driver_info = self
            .driver_profile
            .clone()
            .unwrap_or_else(|| BroadcastDriverInfo {
                name: String::new(),
            });
        self.registry
            .publish_location(BusLocationUpdate {
                bus_id,
                location,
                speed_kmh: speed,
                heading_deg: heading,
                timestamp,
                driver_info,
            })
            .await;
        self.reply(ServerEvent::DriverLocationSent);
    }

    async fn driver_offline(&mut self, bus_id: BusId, reason: Option<String>) {
        if self.role != Some(Role::Driver) || self.driver_room.as_ref() != Some(&bus_id) {
            self.reply(ServerEvent::DriverError {
                message: "no active trip on that bus".to_string(),
            });
            return;
        }
        self.driver_room = None;
        self.driver_profile = None;
        self.registry.driver_offline(&bus_id, reason).await;
    }

    async fn passenger_join(&mut self, bus_id: BusId) {
        if self.role != Some(Role::Passenger) {
            self.reply(ServerEvent::PassengerError {
                bus_id: Some(bus_id),
                message: "identify as a passenger first".to_string(),
            });
            return;
        }
        if !self.subscriptions.contains_key(&bus_id) {
            let receiver = self.registry.subscribe(&bus_id).await;
            let forwarder = spawn_forwarder(receiver, self.outbox.clone());
            self.subscriptions.insert(bus_id.clone(), forwarder);
        }
        // Confirm only when the room is live: a join to a driverless room
        // stays unconfirmed so the passenger's view stays unauthorized
        // until the first real broadcast.
        if self.registry.has_driver(&bus_id).await {
            self.reply(ServerEvent::PassengerJoined { bus_id });
        }
    }

    async fn passenger_leave(&mut self, bus_id: BusId) {
        if let Some(forwarder) = self.subscriptions.remove(&bus_id) {
            forwarder.abort();
        }
        self.registry.cleanup_if_idle(&bus_id).await;
    }

    async fn location_snapshot(&mut self, bus_id: BusId) {
        if self.role != Some(Role::Passenger) {
            self.reply(ServerEvent::PassengerError {
                bus_id: Some(bus_id),
                message: "identify as a passenger first".to_string(),
            });
            return;
        }
        // Nothing cached yet is not an error: the first broadcast will
        // arrive on its own.
        if let Some(update) = self.registry.last_location(&bus_id).await {
            self.reply(ServerEvent::BusLocation(update));
        } else {
            tracing::debug!(bus_id = %bus_id, "location snapshot requested before any broadcast");
        }
    }

    async fn route_snapshot(&mut self, bus_id: BusId) {
        if self.role != Some(Role::Passenger) {
            self.reply(ServerEvent::PassengerError {
                bus_id: Some(bus_id),
                message: "identify as a passenger first".to_string(),
            });
            return;
        }
        if let Some(route) = self.registry.route(&bus_id).await {
            self.reply(ServerEvent::BusRoute(route));
        } else {
            tracing::debug!(bus_id = %bus_id, "no route registered");
        }
    }

    fn reply(&self, event: ServerEvent) {
        // A dead outbox means the client is gone; close() will run soon.
        let _ = self.outbox.send(event);
    }
}

/// Forwards room broadcasts into a connection outbox until either side
/// goes away. A lagged consumer skips what it missed — last-write-wins
/// telemetry tolerates gaps.
fn spawn_forwarder(
    mut room: broadcast::Receiver<ServerEvent>,
    outbox: mpsc::UnboundedSender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match room.recv().await {
                Ok(event) => {
                    if outbox.send(event).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "room consumer lagged; skipping");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::relay::InMemoryActivationTokens;
    use crate::domain::telemetry::GeoPoint;

    fn bus(id: &str) -> BusId {
        BusId::new(id).unwrap()
    }

    struct Harness {
        connection: RelayConnection,
        outbox: mpsc::UnboundedReceiver<ServerEvent>,
    }

    fn harness(
        registry: &Arc<RoomRegistry>,
        tokens: &Arc<InMemoryActivationTokens>,
    ) -> Harness {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let connection = RelayConnection::new(
            Arc::clone(registry),
            Arc::clone(tokens) as Arc<dyn ActivationTokenValidator>,
            outbox_tx,
        );
        Harness {
            connection,
            outbox: outbox_rx,
        }
    }

    fn fixtures() -> (Arc<RoomRegistry>, Arc<InMemoryActivationTokens>) {
        (
            Arc::new(RoomRegistry::with_default_capacity()),
            Arc::new(InMemoryActivationTokens::new()),
        )
    }

    async fn identify_driver(h: &mut Harness, token: &str, bus_id: &str) -> ServerEvent {
        h.connection
            .handle(ClientEvent::Identify {
                credential: IdentificationCredential::Driver {
                    token: token.to_string(),
                    bus_id: bus(bus_id),
                },
            })
            .await;
        h.outbox.recv().await.unwrap()
    }

    async fn identify_passenger(h: &mut Harness) {
        h.connection
            .handle(ClientEvent::Identify {
                credential: IdentificationCredential::Passenger,
            })
            .await;
        let ack = h.outbox.recv().await.unwrap();
        assert!(matches!(ack, ServerEvent::IdentifySuccess));
    }

    #[tokio::test]
    async fn driver_identify_consumes_the_token() {
        let (registry, tokens) = fixtures();
        tokens.insert("123456", bus("BUS1"));

        let mut h = harness(&registry, &tokens);
        let ack = identify_driver(&mut h, "123456", "BUS1").await;
        assert!(matches!(ack, ServerEvent::IdentifySuccess));
        assert_eq!(tokens.outstanding(), 0);

        // A second connection replaying the code is refused.
        let mut h2 = harness(&registry, &tokens);
        let ack = identify_driver(&mut h2, "123456", "BUS1").await;
        match ack {
            ServerEvent::IdentifyError { message } => assert_eq!(message, "invalid token"),
            other => panic!("expected IdentifyError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn room_operations_before_identify_are_refused() {
        let (registry, tokens) = fixtures();
        let mut h = harness(&registry, &tokens);

        h.connection
            .handle(ClientEvent::DriverJoin {
                bus_id: bus("BUS1"),
                driver_info: crate::domain::foundation::DriverInfo::named("Asha"),
            })
            .await;
        assert!(matches!(
            h.outbox.recv().await.unwrap(),
            ServerEvent::DriverError { .. }
        ));

        h.connection
            .handle(ClientEvent::PassengerJoin {
                bus_id: bus("BUS1"),
                passenger_info: None,
            })
            .await;
        assert!(matches!(
            h.outbox.recv().await.unwrap(),
            ServerEvent::PassengerError { .. }
        ));
    }

    #[tokio::test]
    async fn second_identify_is_rejected() {
        let (registry, tokens) = fixtures();
        let mut h = harness(&registry, &tokens);
        identify_passenger(&mut h).await;

        h.connection
            .handle(ClientEvent::Identify {
                credential: IdentificationCredential::Passenger,
            })
            .await;
        assert!(matches!(
            h.outbox.recv().await.unwrap(),
            ServerEvent::IdentifyError { .. }
        ));
    }

    #[tokio::test]
    async fn driver_location_fans_out_and_acks() {
        let (registry, tokens) = fixtures();
        tokens.insert("123456", bus("BUS1"));

        // Passenger joins first.
        let mut passenger = harness(&registry, &tokens);
        identify_passenger(&mut passenger).await;
        passenger
            .connection
            .handle(ClientEvent::PassengerJoin {
                bus_id: bus("BUS1"),
                passenger_info: None,
            })
            .await;

        // Driver identifies, joins, sends one location.
        let mut driver = harness(&registry, &tokens);
        let ack = identify_driver(&mut driver, "123456", "BUS1").await;
        assert!(matches!(ack, ServerEvent::IdentifySuccess));
        driver
            .connection
            .handle(ClientEvent::DriverJoin {
                bus_id: bus("BUS1"),
                driver_info: crate::domain::foundation::DriverInfo::named("Asha"),
            })
            .await;
        assert!(matches!(
            driver.outbox.recv().await.unwrap(),
            ServerEvent::DriverJoined { .. }
        ));

        driver
            .connection
            .handle(ClientEvent::DriverLocation {
                bus_id: bus("BUS1"),
                location: GeoPoint::new(28.7, 77.1),
                speed: 10.0,
                heading: 90.0,
                timestamp: Timestamp::now(),
            })
            .await;
        assert!(matches!(
            driver.outbox.recv().await.unwrap(),
            ServerEvent::DriverLocationSent
        ));

        // The passenger sees the driver come online, then the broadcast.
        assert!(matches!(
            passenger.outbox.recv().await.unwrap(),
            ServerEvent::DriverOnline(_)
        ));
        match passenger.outbox.recv().await.unwrap() {
            ServerEvent::BusLocation(update) => {
                assert_eq!(update.bus_id, bus("BUS1"));
                assert_eq!(update.speed_kmh, 10.0);
                assert_eq!(update.driver_info.name, "Asha");
            }
            other => panic!("expected BusLocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_to_driverless_room_is_not_confirmed() {
        let (registry, tokens) = fixtures();
        let mut h = harness(&registry, &tokens);
        identify_passenger(&mut h).await;

        h.connection
            .handle(ClientEvent::PassengerJoin {
                bus_id: bus("BUS1"),
                passenger_info: None,
            })
            .await;
        h.connection
            .handle(ClientEvent::PassengerLocationRequest {
                bus_id: bus("BUS1"),
            })
            .await;

        // No confirmation, no snapshot: the outbox stays empty.
        assert!(h.outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_requests_serve_cached_state() {
        let (registry, tokens) = fixtures();
        registry
            .register_route(
                &bus("BUS1"),
                crate::domain::telemetry::RouteInfo {
                    route_name: "Ring Road Express".to_string(),
                    stops: vec!["Depot".into(), "Market".into()],
                },
            )
            .await;
        registry
            .publish_location(BusLocationUpdate {
                bus_id: bus("BUS1"),
                location: GeoPoint::new(28.7, 77.1),
                speed_kmh: 36.0,
                heading_deg: 90.0,
                timestamp: Timestamp::now(),
                driver_info: BroadcastDriverInfo {
                    name: "Asha".to_string(),
                },
            })
            .await;

        let mut h = harness(&registry, &tokens);
        identify_passenger(&mut h).await;

        h.connection
            .handle(ClientEvent::PassengerLocationRequest {
                bus_id: bus("BUS1"),
            })
            .await;
        assert!(matches!(
            h.outbox.recv().await.unwrap(),
            ServerEvent::BusLocation(_)
        ));

        h.connection
            .handle(ClientEvent::PassengerRouteRequest {
                bus_id: bus("BUS1"),
            })
            .await;
        match h.outbox.recv().await.unwrap() {
            ServerEvent::BusRoute(route) => assert_eq!(route.total_stops, 2),
            other => panic!("expected BusRoute, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_a_driver_connection_marks_the_room_offline() {
        let (registry, tokens) = fixtures();
        tokens.insert("123456", bus("BUS1"));

        let mut passenger = harness(&registry, &tokens);
        identify_passenger(&mut passenger).await;
        passenger
            .connection
            .handle(ClientEvent::PassengerJoin {
                bus_id: bus("BUS1"),
                passenger_info: None,
            })
            .await;

        let mut driver = harness(&registry, &tokens);
        identify_driver(&mut driver, "123456", "BUS1").await;
        driver
            .connection
            .handle(ClientEvent::DriverJoin {
                bus_id: bus("BUS1"),
                driver_info: crate::domain::foundation::DriverInfo::named("Asha"),
            })
            .await;

        // Connection drops without an explicit driver:offline.
        driver.connection.close().await;

        assert!(matches!(
            passenger.outbox.recv().await.unwrap(),
            ServerEvent::DriverOnline(_)
        ));
        match passenger.outbox.recv().await.unwrap() {
            ServerEvent::DriverWentOffline(status) => {
                assert_eq!(status.reason.as_deref(), Some("connection lost"));
            }
            other => panic!("expected DriverWentOffline, got {other:?}"),
        }
        assert!(!registry.has_driver(&bus("BUS1")).await);
    }
}
