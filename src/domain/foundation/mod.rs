//! Foundation value objects shared across the domain.

mod actors;
mod connection_state;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use actors::{DriverInfo, PassengerInfo, Role};
pub use connection_state::ConnectionState;
pub use errors::ValidationError;
pub use ids::BusId;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
