//! Bus rooms: broadcast groups keyed by `BusId`.
//!
//! A room fans every broadcast out to all subscribed connections, and
//! additionally remembers the facts a late joiner needs: the last known
//! location, the current driver, and the registered route. The relay is
//! an authoritative relay, not an origin — everything here was said by
//! some driver first.
//!
//! ```text
//! Room: BUS1            Room: BUS2
//! ├── passenger-a       ├── passenger-d
//! ├── passenger-b       └── passenger-e
//! └── passenger-c
//! ```
//!
//! # Thread Safety
//!
//! Uses `RwLock` for the room registry since broadcasts (reads) vastly
//! outnumber joins/leaves (writes).

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use crate::domain::foundation::{BusId, Timestamp};
use crate::domain::protocol::ServerEvent;
use crate::domain::telemetry::{
    BroadcastDriverInfo, BusLocationUpdate, BusRoute, DriverStatusUpdate, RouteInfo,
};

struct Room {
    sender: broadcast::Sender<ServerEvent>,
    driver: Option<BroadcastDriverInfo>,
    last_location: Option<BusLocationUpdate>,
    route: Option<RouteInfo>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            driver: None,
            last_location: None,
            route: None,
        }
    }
}

/// Registry of bus rooms with per-room broadcast channels.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<BusId, Room>>,

    /// Buffer size for each room's broadcast channel. Slow consumers that
    /// fall more than this far behind miss updates — acceptable for
    /// last-write-wins telemetry.
    channel_capacity: usize,
}

impl RoomRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    /// Create with default capacity (128 messages).
    pub fn with_default_capacity() -> Self {
        Self::new(128)
    }

    /// Subscribes to a bus room, creating the room if absent.
    pub async fn subscribe(&self, bus_id: &BusId) -> broadcast::Receiver<ServerEvent> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(bus_id.clone())
            .or_insert_with(|| Room::new(self.channel_capacity))
            .sender
            .subscribe()
    }

    /// Claims the driver seat of a room. At most one driver per bus:
    /// returns `false` when the seat is taken, leaving the room untouched.
    /// On success the room broadcasts `driver:online`.
    pub async fn try_claim_driver(&self, bus_id: &BusId, driver: BroadcastDriverInfo) -> bool {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(bus_id.clone())
            .or_insert_with(|| Room::new(self.channel_capacity));
        if room.driver.is_some() {
            return false;
        }
        room.driver = Some(driver.clone());
        let _ = room.sender.send(ServerEvent::DriverOnline(DriverStatusUpdate {
            bus_id: bus_id.clone(),
            driver_info: Some(driver),
            reason: None,
            timestamp: Timestamp::now(),
        }));
        true
    }

    /// Releases the driver seat and broadcasts `driver:offline`.
    /// No-op when the room has no driver.
    pub async fn driver_offline(&self, bus_id: &BusId, reason: Option<String>) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(bus_id) {
            if room.driver.take().is_none() {
                return;
            }
            let _ = room
                .sender
                .send(ServerEvent::DriverWentOffline(DriverStatusUpdate {
                    bus_id: bus_id.clone(),
                    driver_info: None,
                    reason,
                    timestamp: Timestamp::now(),
                }));
        }
    }

    /// Caches the update as the room's last known location and broadcasts
    /// `bus:location` to everyone in the room.
    pub async fn publish_location(&self, update: BusLocationUpdate) {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(update.bus_id.clone())
            .or_insert_with(|| Room::new(self.channel_capacity));
        room.last_location = Some(update.clone());
        let _ = room.sender.send(ServerEvent::BusLocation(update));
    }

    /// Last known location of a bus, if any driver reported one.
    pub async fn last_location(&self, bus_id: &BusId) -> Option<BusLocationUpdate> {
        self.rooms
            .read()
            .await
            .get(bus_id)
            .and_then(|room| room.last_location.clone())
    }

    /// Registers the route served to passenger snapshot requests.
    pub async fn register_route(&self, bus_id: &BusId, route: RouteInfo) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(bus_id.clone())
            .or_insert_with(|| Room::new(self.channel_capacity))
            .route = Some(route);
    }

    /// Route snapshot for a bus, if registered.
    pub async fn route(&self, bus_id: &BusId) -> Option<BusRoute> {
        self.rooms
            .read()
            .await
            .get(bus_id)
            .and_then(|room| room.route.clone())
            .map(|route| BusRoute::new(bus_id.clone(), route))
    }

    /// Whether a driver currently holds the room.
    pub async fn has_driver(&self, bus_id: &BusId) -> bool {
        self.rooms
            .read()
            .await
            .get(bus_id)
            .map_or(false, |room| room.driver.is_some())
    }

    /// Number of subscribed connections in a room (0 if absent).
    pub async fn subscriber_count(&self, bus_id: &BusId) -> usize {
        self.rooms
            .read()
            .await
            .get(bus_id)
            .map(|room| room.sender.receiver_count())
            .unwrap_or(0)
    }

    /// All room IDs (for monitoring/debugging).
    pub async fn active_rooms(&self) -> Vec<BusId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Drops a room once nothing references it: no subscribers, no
    /// driver. Called after a leave to keep the registry from growing
    /// forever.
    pub async fn cleanup_if_idle(&self, bus_id: &BusId) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(bus_id) {
            if room.sender.receiver_count() == 0 && room.driver.is_none() {
                rooms.remove(bus_id);
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::GeoPoint;

    fn bus(id: &str) -> BusId {
        BusId::new(id).unwrap()
    }

    fn driver() -> BroadcastDriverInfo {
        BroadcastDriverInfo {
            name: "Asha".to_string(),
        }
    }

    fn update(id: &str) -> BusLocationUpdate {
        BusLocationUpdate {
            bus_id: bus(id),
            location: GeoPoint::new(28.7, 77.1),
            speed_kmh: 36.0,
            heading_deg: 90.0,
            timestamp: Timestamp::now(),
            driver_info: driver(),
        }
    }

    #[tokio::test]
    async fn subscribe_creates_room_if_absent() {
        let registry = RoomRegistry::with_default_capacity();
        let _rx = registry.subscribe(&bus("BUS1")).await;
        assert_eq!(registry.active_rooms().await.len(), 1);
        assert_eq!(registry.subscriber_count(&bus("BUS1")).await, 1);
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let registry = RoomRegistry::with_default_capacity();
        let mut rx1 = registry.subscribe(&bus("BUS1")).await;
        let mut rx2 = registry.subscribe(&bus("BUS1")).await;

        registry.publish_location(update("BUS1")).await;

        assert!(matches!(
            rx1.recv().await.unwrap(),
            ServerEvent::BusLocation(_)
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ServerEvent::BusLocation(_)
        ));
    }

    #[tokio::test]
    async fn rooms_are_isolated_from_each_other() {
        let registry = RoomRegistry::with_default_capacity();
        let mut bus1_rx = registry.subscribe(&bus("BUS1")).await;
        let mut bus2_rx = registry.subscribe(&bus("BUS2")).await;

        registry.publish_location(update("BUS1")).await;

        assert!(bus1_rx.recv().await.is_ok());
        // Nothing lands in BUS2.
        assert!(bus2_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_caches_last_location() {
        let registry = RoomRegistry::with_default_capacity();
        assert!(registry.last_location(&bus("BUS1")).await.is_none());

        registry.publish_location(update("BUS1")).await;

        let cached = registry.last_location(&bus("BUS1")).await.unwrap();
        assert_eq!(cached.speed_kmh, 36.0);
    }

    #[tokio::test]
    async fn later_location_wins() {
        let registry = RoomRegistry::with_default_capacity();
        registry.publish_location(update("BUS1")).await;

        let mut newer = update("BUS1");
        newer.speed_kmh = 48.0;
        registry.publish_location(newer).await;

        let cached = registry.last_location(&bus("BUS1")).await.unwrap();
        assert_eq!(cached.speed_kmh, 48.0);
    }

    #[tokio::test]
    async fn driver_seat_is_exclusive() {
        let registry = RoomRegistry::with_default_capacity();

        assert!(registry.try_claim_driver(&bus("BUS1"), driver()).await);
        assert!(!registry.try_claim_driver(&bus("BUS1"), driver()).await);
        assert!(registry.has_driver(&bus("BUS1")).await);

        registry.driver_offline(&bus("BUS1"), None).await;
        assert!(!registry.has_driver(&bus("BUS1")).await);
        // Seat is free again.
        assert!(registry.try_claim_driver(&bus("BUS1"), driver()).await);
    }

    #[tokio::test]
    async fn presence_transitions_are_broadcast() {
        let registry = RoomRegistry::with_default_capacity();
        let mut rx = registry.subscribe(&bus("BUS1")).await;

        registry.try_claim_driver(&bus("BUS1"), driver()).await;
        registry
            .driver_offline(&bus("BUS1"), Some("shift over".to_string()))
            .await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerEvent::DriverOnline(_)
        ));
        match rx.recv().await.unwrap() {
            ServerEvent::DriverWentOffline(status) => {
                assert_eq!(status.reason.as_deref(), Some("shift over"));
            }
            other => panic!("expected DriverWentOffline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_without_driver_broadcasts_nothing() {
        let registry = RoomRegistry::with_default_capacity();
        let mut rx = registry.subscribe(&bus("BUS1")).await;

        registry.driver_offline(&bus("BUS1"), None).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn route_snapshot_counts_stops() {
        let registry = RoomRegistry::with_default_capacity();
        registry
            .register_route(
                &bus("BUS1"),
                RouteInfo {
                    route_name: "Ring Road Express".to_string(),
                    stops: vec!["Depot".into(), "Market".into(), "Station".into()],
                },
            )
            .await;

        let snapshot = registry.route(&bus("BUS1")).await.unwrap();
        assert_eq!(snapshot.total_stops, 3);
        assert!(registry.route(&bus("BUS2")).await.is_none());
    }

    #[tokio::test]
    async fn idle_rooms_are_cleaned_up() {
        let registry = RoomRegistry::with_default_capacity();
        {
            let _rx = registry.subscribe(&bus("BUS1")).await;
            // Receiver dropped here.
        }
        registry.cleanup_if_idle(&bus("BUS1")).await;
        assert!(registry.active_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn room_with_driver_survives_cleanup() {
        let registry = RoomRegistry::with_default_capacity();
        registry.try_claim_driver(&bus("BUS1"), driver()).await;
        registry.cleanup_if_idle(&bus("BUS1")).await;
        assert_eq!(registry.active_rooms().await.len(), 1);
    }
}
