//! Connection lifecycle state for a realtime transport session.

use serde::Serialize;

use super::{Role, StateMachine};

/// Lifecycle state of a transport session.
///
/// `Identified` is a sub-state of being connected: it is only reachable
/// through a successful identification handshake, and it pins the role
/// for the rest of the connection (role transitions are monotonic — a
/// session never re-identifies or switches roles without a full
/// disconnect).
///
/// A lost transport moves the session back to `Connecting` while the
/// reconnection policy runs; a successful reconnect lands in `Connected`,
/// not `Identified`, because the new connection has not performed the
/// handshake yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Identified(Role),
}

impl ConnectionState {
    /// True while a live transport is attached (identified or not).
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Identified(_)
        )
    }

    /// The role bound by the handshake, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            ConnectionState::Identified(role) => Some(*role),
            _ => None,
        }
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        match (self, target) {
            (Disconnected, Connecting) => true,
            (Connecting, Connected) | (Connecting, Disconnected) => true,
            (Connected, Identified(_)) => true,
            // Transport lost: drop back to Connecting while reconnecting.
            (Connected, Connecting) | (Identified(_), Connecting) => true,
            (Connected, Disconnected) | (Identified(_), Disconnected) => true,
            _ => false,
        }
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Disconnected => vec![Connecting],
            Connecting => vec![Connected, Disconnected],
            Connected => vec![
                Identified(Role::Driver),
                Identified(Role::Passenger),
                Connecting,
                Disconnected,
            ],
            Identified(_) => vec![Connecting, Disconnected],
        }
    }
}
