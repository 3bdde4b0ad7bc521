//! Geolocation acquisition configuration
//!
//! The fix timeout and cached-fix age are looser than a naive default on
//! purpose: tight values produce spurious timeouts on weak-signal mobile
//! networks and drain the battery re-acquiring fixes the device already has.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Geolocation acquisition configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeolocationConfig {
    /// Request the highest accuracy the device offers
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Seconds to wait for a single position fix
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_secs: u64,

    /// Maximum acceptable age of a cached fix, in seconds
    #[serde(default = "default_max_fix_age")]
    pub max_fix_age_secs: u64,

    /// Manual retries allowed after a fatal acquisition error
    #[serde(default = "default_max_manual_retries")]
    pub max_manual_retries: u32,
}

impl GeolocationConfig {
    /// Position fix timeout as a [`Duration`]
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs)
    }

    /// Maximum cached fix age as a [`Duration`]
    pub fn max_fix_age(&self) -> Duration {
        Duration::from_secs(self.max_fix_age_secs)
    }

    /// Validate geolocation configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fix_timeout_secs == 0 {
            return Err(ValidationError::InvalidFixTimeout);
        }
        if self.max_manual_retries == 0 || self.max_manual_retries > 10 {
            return Err(ValidationError::InvalidRetryCeiling);
        }
        Ok(())
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            fix_timeout_secs: default_fix_timeout(),
            max_fix_age_secs: default_max_fix_age(),
            max_manual_retries: default_max_manual_retries(),
        }
    }
}

fn default_high_accuracy() -> bool {
    true
}

fn default_fix_timeout() -> u64 {
    30
}

fn default_max_fix_age() -> u64 {
    5
}

fn default_max_manual_retries() -> u32 {
    3
}
