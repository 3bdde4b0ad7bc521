//! Geolocation acquisition service.

mod acquirer;

pub use acquirer::GeolocationAcquirer;
