//! ActivationTokenValidator port - Interface for driver token checks.
//!
//! Activation tokens are short-lived numeric one-time codes minted by the
//! out-of-band bus-activation call. The relay consumes a token during the
//! driver identification handshake; a token that has been consumed once
//! must never validate again.

use crate::domain::foundation::BusId;

/// Port for consuming driver activation tokens.
pub trait ActivationTokenValidator: Send + Sync {
    /// Atomically checks and consumes a token for the given bus.
    ///
    /// Returns `true` exactly once per minted token, and only when the
    /// token was minted for that bus.
    fn consume(&self, code: &str, bus_id: &BusId) -> bool;
}
