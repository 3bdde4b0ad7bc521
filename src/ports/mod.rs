//! Ports (interfaces) for external collaborators.
//!
//! Each port is a narrow trait owned by the domain/application side and
//! implemented by an adapter: the realtime wire, the device GPS, and the
//! activation-token store.

mod position_source;
mod token_validator;
mod transport;

pub use position_source::{
    AcquisitionOptions, GeolocationError, PositionSource, PositionWatch, SourceReport,
};
pub use token_validator::ActivationTokenValidator;
pub use transport::{Transport, TransportConnector, TransportError, TransportKind};
