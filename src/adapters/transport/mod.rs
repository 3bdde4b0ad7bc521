//! Transport adapters for the realtime wire.
//!
//! WebSocket is the preferred transport; long-polling is the fallback for
//! hostile networks; the in-memory channel pair exists for tests.

mod fallback;
mod in_memory;
mod polling;
mod websocket;

pub use fallback::FallbackConnector;
pub use in_memory::{channel_pair, ChannelConnector, ChannelTransport, FarEnd, RelayEnd};
pub use polling::{LongPollingTransport, PollingConnector};
pub use websocket::{WebSocketConnector, WebSocketTransport};
