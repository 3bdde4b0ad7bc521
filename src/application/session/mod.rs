//! Realtime session layer.
//!
//! One [`TransportSession`] per process, constructed explicitly (no
//! hidden global) and injected into the role wrappers:
//!
//! ```text
//! GeolocationAcquirer ─▶ DriverSession ─┐
//!                                       ├─▶ TransportSession ─▶ relay
//! UI / views ◀── PassengerSession ◀─────┘         │
//!                        DiagnosticsLog ◀─────────┘ (observer)
//! ```

mod diagnostics;
mod driver;
mod error;
mod identify;
mod passenger;
mod registry;
mod topics;
mod transport_session;

pub use diagnostics::{DiagnosticsLog, DIAGNOSTICS_CAPACITY};
pub use driver::{ActiveTrip, DriverSession};
pub use error::RealtimeError;
pub use identify::{identify_driver, identify_passenger};
pub use passenger::{BusView, DriverPresence, PassengerSession};
pub use registry::{Listener, ListenerError, ListenerRegistry, SubscriptionId};
pub use topics::{DisconnectReason, SessionEvent, Topic};
pub use transport_session::TransportSession;
