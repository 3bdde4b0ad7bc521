//! Error types for the realtime session layer.

use thiserror::Error;

use crate::domain::foundation::{BusId, Role, ValidationError};
use crate::ports::TransportError;

/// Failures surfaced by the client session layer.
///
/// Initial-connect failures reject the calling operation and are the
/// caller's to surface; mid-session transport loss is absorbed by the
/// reconnection policy and only shows up here once retries are exhausted.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("timed out establishing a connection to the tracking relay")]
    ConnectTimeout,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("identification rejected: {message}")]
    IdentifyRejected { message: String },

    #[error("timed out waiting for the identification ack")]
    IdentifyTimeout,

    #[error("session is already identified as {role}")]
    AlreadyIdentified { role: Role },

    #[error("not connected - connect the session before emitting")]
    NotConnected,

    #[error("operation requires an identified {required} session")]
    NotIdentified { required: Role },

    #[error("room join rejected: {message}")]
    JoinRejected { message: String },

    #[error("a trip is already active on bus {bus_id}; end it before starting another")]
    TripAlreadyActive { bus_id: BusId },

    #[error("invalid session state transition: {0}")]
    State(#[from] ValidationError),
}
