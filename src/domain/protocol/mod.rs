//! Wire protocol shared by client sessions and the relay.

mod events;

pub use events::{ClientEvent, IdentificationCredential, ServerEvent};
