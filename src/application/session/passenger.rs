//! Passenger room session: track buses and consume the fan-out.
//!
//! A passenger may track several buses at once (the UI restricts to one,
//! the protocol does not). Each tracked bus has its own view holding
//! three orthogonal facts that must never be conflated: whether the view
//! is authorized, the last known location, and the driver's presence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::domain::foundation::{BusId, PassengerInfo, Role};
use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::domain::telemetry::{BusLocationUpdate, BusRoute};

use super::error::RealtimeError;
use super::identify;
use super::topics::{SessionEvent, Topic};
use super::transport_session::TransportSession;

const POISONED: &str = "passenger session lock poisoned";

/// Driver presence as seen from a passenger view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DriverPresence {
    #[default]
    Unknown,
    Online,
    Offline {
        reason: Option<String>,
    },
}

/// Everything a passenger knows about one tracked bus.
///
/// `authorized` flips true only on a location update, a join
/// confirmation, or an info message scoped to this bus. A `join_error`
/// is terminal for the current join and is a distinct condition from the
/// driver being offline.
#[derive(Debug, Clone, Default)]
pub struct BusView {
    pub authorized: bool,
    pub last_location: Option<BusLocationUpdate>,
    pub driver: DriverPresence,
    pub route: Option<BusRoute>,
    pub join_error: Option<String>,
}

/// Passenger-side view of the realtime session.
#[derive(Clone)]
pub struct PassengerSession {
    shared: Arc<PassengerShared>,
}

struct PassengerShared {
    session: TransportSession,
    views: Mutex<HashMap<BusId, BusView>>,
    identify_error: Mutex<Option<String>>,
}

impl PassengerSession {
    /// Wraps a transport session and registers the room listeners.
    pub fn new(session: TransportSession) -> Self {
        let shared = Arc::new(PassengerShared {
            session,
            views: Mutex::new(HashMap::new()),
            identify_error: Mutex::new(None),
        });

        register_listeners(&shared);

        Self { shared }
    }

    /// The underlying transport session.
    pub fn session(&self) -> &TransportSession {
        &self.shared.session
    }

    /// Connects and identifies as a passenger.
    ///
    /// Passenger identity is best-effort: this resolves without waiting
    /// for an ack, and a later `identify:error` lands in
    /// [`Self::identify_error`] where a retry can find it.
    pub async fn connect_as_passenger(&self) -> Result<(), RealtimeError> {
        self.shared.session.connect().await?;
        identify::identify_passenger(&self.shared.session)?;
        Ok(())
    }

    /// Starts tracking a bus and schedules the post-join snapshot
    /// requests: after a short delay (letting the relay process the
    /// join), the session asks for the current location and route rather
    /// than waiting passively for the next broadcast. That bridges the
    /// gap for a passenger who joins between two driver broadcasts.
    pub fn join_bus_tracking(
        &self,
        bus_id: BusId,
        info: Option<PassengerInfo>,
    ) -> Result<(), RealtimeError> {
        self.ensure_passenger()?;
        self.shared.session.emit(ClientEvent::PassengerJoin {
            bus_id: bus_id.clone(),
            passenger_info: info,
        })?;
        self.shared
            .views
            .lock()
            .expect(POISONED)
            .entry(bus_id.clone())
            .or_default();
        tracing::info!(bus_id = %bus_id, "tracking bus");

        let weak = Arc::downgrade(&self.shared);
        let delay = self.shared.session.config().snapshot_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            request_snapshots(weak, bus_id);
        });
        Ok(())
    }

    /// Stops tracking a bus and drops its view.
    pub fn leave_bus_tracking(&self, bus_id: &BusId) -> Result<(), RealtimeError> {
        self.ensure_passenger()?;
        self.shared.session.emit(ClientEvent::PassengerLeave {
            bus_id: bus_id.clone(),
        })?;
        self.shared.views.lock().expect(POISONED).remove(bus_id);
        tracing::info!(bus_id = %bus_id, "stopped tracking bus");
        Ok(())
    }

    /// Asks the relay for the last known location of a bus.
    pub fn request_current_location(&self, bus_id: &BusId) -> Result<(), RealtimeError> {
        self.ensure_passenger()?;
        self.shared
            .session
            .emit(ClientEvent::PassengerLocationRequest {
                bus_id: bus_id.clone(),
            })
    }

    /// Asks the relay for the route of a bus.
    pub fn request_route_info(&self, bus_id: &BusId) -> Result<(), RealtimeError> {
        self.ensure_passenger()?;
        self.shared.session.emit(ClientEvent::PassengerRouteRequest {
            bus_id: bus_id.clone(),
        })
    }

    /// Snapshot of the view for one tracked bus.
    pub fn view(&self, bus_id: &BusId) -> Option<BusView> {
        self.shared.views.lock().expect(POISONED).get(bus_id).cloned()
    }

    /// Whether the view for a bus has been authorized.
    pub fn is_authorized(&self, bus_id: &BusId) -> bool {
        self.view(bus_id).map_or(false, |view| view.authorized)
    }

    /// Buses currently tracked by this session.
    pub fn tracked_buses(&self) -> Vec<BusId> {
        self.shared.views.lock().expect(POISONED).keys().cloned().collect()
    }

    /// A late identification rejection, if the relay sent one.
    pub fn identify_error(&self) -> Option<String> {
        self.shared.identify_error.lock().expect(POISONED).clone()
    }

    fn ensure_passenger(&self) -> Result<(), RealtimeError> {
        if !self.shared.session.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        match self.shared.session.role() {
            Some(Role::Passenger) => Ok(()),
            _ => Err(RealtimeError::NotIdentified {
                required: Role::Passenger,
            }),
        }
    }
}

fn register_listeners(shared: &Arc<PassengerShared>) {
    let events = shared.session.events();

    let on = |topic: Topic,
              shared: &Arc<PassengerShared>,
              apply: fn(&PassengerShared, &SessionEvent)| {
        let weak: Weak<PassengerShared> = Arc::downgrade(shared);
        events.on(
            topic,
            Arc::new(move |event| {
                if let Some(shared) = weak.upgrade() {
                    apply(&shared, event);
                }
                Ok(())
            }),
        );
    };

    on(Topic::BusLocation, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::BusLocation(update)) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(&update.bus_id) {
                view.authorized = true;
                view.last_location = Some(update.clone());
            }
        }
    });

    on(Topic::PassengerJoined, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::PassengerJoined { bus_id }) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(bus_id) {
                view.authorized = true;
            }
        }
    });

    on(Topic::PassengerInfo, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::PassengerInfo { bus_id, message }) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(bus_id) {
                view.authorized = true;
            }
            tracing::debug!(bus_id = %bus_id, %message, "passenger info");
        }
    });

    on(Topic::PassengerError, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::PassengerError { bus_id, message }) = event {
            let Some(bus_id) = bus_id else {
                tracing::warn!(%message, "passenger error without bus scope");
                return;
            };
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(bus_id) {
                // Terminal for this join; not retried automatically.
                view.join_error = Some(message.clone());
            }
        }
    });

    on(Topic::DriverOnline, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::DriverOnline(status)) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(&status.bus_id) {
                view.driver = DriverPresence::Online;
            }
        }
    });

    on(Topic::DriverOffline, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::DriverWentOffline(status)) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(&status.bus_id) {
                view.driver = DriverPresence::Offline {
                    reason: status.reason.clone(),
                };
            }
        }
    });

    on(Topic::BusRoute, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::BusRoute(route)) = event {
            let mut views = shared.views.lock().expect(POISONED);
            if let Some(view) = views.get_mut(&route.bus_id) {
                view.route = Some(route.clone());
            }
        }
    });

    on(Topic::IdentifyError, shared, |shared, event| {
        if let SessionEvent::Wire(ServerEvent::IdentifyError { message }) = event {
            *shared.identify_error.lock().expect(POISONED) = Some(message.clone());
        }
    });

    // Re-identify and re-join every tracked bus after a reconnect; role
    // and membership context live here, not in the transport session.
    {
        let weak: Weak<PassengerShared> = Arc::downgrade(shared);
        events.on(
            Topic::Reconnected,
            Arc::new(move |_event| {
                if let Some(shared) = weak.upgrade() {
                    tokio::spawn(resume_after_reconnect(shared));
                }
                Ok(())
            }),
        );
    }
}

fn request_snapshots(weak: Weak<PassengerShared>, bus_id: BusId) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    // Left the room while the delay ran: nothing to request.
    if !shared.views.lock().expect(POISONED).contains_key(&bus_id) {
        return;
    }
    if let Err(error) = shared.session.emit(ClientEvent::PassengerLocationRequest {
        bus_id: bus_id.clone(),
    }) {
        tracing::debug!(%error, "post-join location snapshot request skipped");
    }
    if let Err(error) = shared
        .session
        .emit(ClientEvent::PassengerRouteRequest { bus_id })
    {
        tracing::debug!(%error, "post-join route snapshot request skipped");
    }
}

async fn resume_after_reconnect(shared: Arc<PassengerShared>) {
    if let Err(error) = identify::identify_passenger(&shared.session) {
        tracing::warn!(%error, "passenger re-identification after reconnect failed");
        return;
    }
    let tracked: Vec<BusId> = shared.views.lock().expect(POISONED).keys().cloned().collect();
    for bus_id in tracked {
        let rejoin = shared.session.emit(ClientEvent::PassengerJoin {
            bus_id: bus_id.clone(),
            passenger_info: None,
        });
        match rejoin {
            Ok(()) => tracing::info!(bus_id = %bus_id, "re-joined bus room after reconnect"),
            Err(error) => tracing::warn!(%error, "re-join after reconnect failed"),
        }
    }
}
