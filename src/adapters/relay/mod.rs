//! Relay server: the counterpart service the client sessions talk to.
//!
//! Rooms keyed by bus, driver-token validation, telemetry fan-out, and
//! snapshot replies, served over WebSocket with a long-poll fallback.

mod connection;
mod polling;
mod rooms;
mod tokens;
mod ws;

pub use connection::RelayConnection;
pub use polling::PollSessions;
pub use rooms::RoomRegistry;
pub use tokens::InMemoryActivationTokens;
pub use ws::{realtime_router, RelayState};
