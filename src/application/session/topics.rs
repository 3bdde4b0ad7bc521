//! Typed topics and payloads for the session event bus.
//!
//! The registry dispatches by [`Topic`], a closed enum rather than ad hoc
//! strings, so a subscription to a misspelled topic is a compile error and
//! every payload arrives as a typed [`SessionEvent`].

use crate::domain::protocol::ServerEvent;
use crate::ports::TransportKind;

/// Every class of event the session can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    // Connection lifecycle
    Connect,
    Disconnect,
    Reconnected,

    // Identification handshake
    IdentifySuccess,
    IdentifyError,

    // Driver room
    DriverJoined,
    DriverError,
    LocationSent,

    // Room broadcasts
    BusLocation,
    DriverOnline,
    DriverOffline,

    // Passenger room
    PassengerJoined,
    PassengerError,
    PassengerInfo,
    BusRoute,
}

/// Why a session lost (or gave up) its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called: full teardown.
    Explicit,
    /// The transport dropped unexpectedly; reconnection is running.
    TransportLost,
    /// Reconnection gave up after the attempt ceiling.
    RetriesExhausted,
}

/// Payload delivered to session listeners.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected { transport: TransportKind },
    Disconnected { reason: DisconnectReason },
    Reconnected { attempt: u32 },
    Wire(ServerEvent),
}

impl SessionEvent {
    /// The topic this event dispatches under.
    pub fn topic(&self) -> Topic {
        match self {
            SessionEvent::Connected { .. } => Topic::Connect,
            SessionEvent::Disconnected { .. } => Topic::Disconnect,
            SessionEvent::Reconnected { .. } => Topic::Reconnected,
            SessionEvent::Wire(event) => match event {
                ServerEvent::IdentifySuccess => Topic::IdentifySuccess,
                ServerEvent::IdentifyError { .. } => Topic::IdentifyError,
                ServerEvent::DriverJoined { .. } => Topic::DriverJoined,
                ServerEvent::DriverError { .. } => Topic::DriverError,
                ServerEvent::DriverLocationSent => Topic::LocationSent,
                ServerEvent::BusLocation(_) => Topic::BusLocation,
                ServerEvent::DriverOnline(_) => Topic::DriverOnline,
                ServerEvent::DriverWentOffline(_) => Topic::DriverOffline,
                ServerEvent::PassengerJoined { .. } => Topic::PassengerJoined,
                ServerEvent::PassengerError { .. } => Topic::PassengerError,
                ServerEvent::PassengerInfo { .. } => Topic::PassengerInfo,
                ServerEvent::BusRoute(_) => Topic::BusRoute,
            },
        }
    }
}
