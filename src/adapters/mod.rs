//! Adapters (implementations) for the ports.

pub mod geolocation;
pub mod relay;
pub mod transport;
