//! Actor roles and their public profiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two roles a realtime session can identify as.
///
/// A connection carries at most one role for its whole lifetime; role is
/// bound by the identification handshake and only cleared by teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Passenger,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Driver => write!(f, "driver"),
            Role::Passenger => write!(f, "passenger"),
        }
    }
}

/// Public profile a driver announces when joining a bus room.
///
/// The name is shown to passengers next to the moving bus; the phone
/// number is optional and only relayed to the operator surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl DriverInfo {
    /// Creates a profile with a display name only.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: None,
        }
    }
}

/// Optional profile a passenger may attach when joining a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
