//! Geolocation source adapters.

mod simulated;

pub use simulated::SimulatedPositionSource;
