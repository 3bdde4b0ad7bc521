//! Realtime session configuration
//!
//! Tunables for the client transport session (connect/identify timeouts,
//! reconnection policy) and the relay's room channels. The defaults are
//! tuned for unreliable mobile networks: a generous connect window and a
//! linear reconnect backoff that gives a flaky cell link room to recover.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Realtime session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Seconds to wait for the initial transport connect
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for the driver identification ack
    #[serde(default = "default_identify_timeout")]
    pub identify_timeout_secs: u64,

    /// Automatic reconnection attempts after an unexpected disconnect
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Backoff step in seconds; attempt N waits N * step
    #[serde(default = "default_reconnect_backoff_step")]
    pub reconnect_backoff_step_secs: u64,

    /// Delay before a passenger requests a snapshot after joining a room
    #[serde(default = "default_snapshot_delay")]
    pub snapshot_delay_ms: u64,

    /// Buffer size for each room's broadcast channel
    #[serde(default = "default_room_capacity")]
    pub room_channel_capacity: usize,
}

impl RealtimeConfig {
    /// Initial connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Driver identify ack timeout as a [`Duration`]
    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(self.identify_timeout_secs)
    }

    /// Backoff delay before reconnect attempt `attempt` (1-based)
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.reconnect_backoff_step_secs * u64::from(attempt))
    }

    /// Post-join snapshot request delay as a [`Duration`]
    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_delay_ms)
    }

    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 120 {
            return Err(ValidationError::InvalidConnectTimeout);
        }
        if self.identify_timeout_secs == 0 || self.identify_timeout_secs > 120 {
            return Err(ValidationError::InvalidIdentifyTimeout);
        }
        if self.reconnect_max_attempts == 0 || self.reconnect_max_attempts > 20 {
            return Err(ValidationError::InvalidReconnectCeiling);
        }
        if self.reconnect_backoff_step_secs == 0 {
            return Err(ValidationError::InvalidBackoffStep);
        }
        if self.room_channel_capacity == 0 {
            return Err(ValidationError::InvalidRoomCapacity);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            identify_timeout_secs: default_identify_timeout(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_backoff_step_secs: default_reconnect_backoff_step(),
            snapshot_delay_ms: default_snapshot_delay(),
            room_channel_capacity: default_room_capacity(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_identify_timeout() -> u64 {
    10
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_reconnect_backoff_step() -> u64 {
    2
}

fn default_snapshot_delay() -> u64 {
    1000
}

fn default_room_capacity() -> usize {
    128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.reconnect_max_attempts, 5);
        assert_eq!(config.reconnect_backoff_step_secs, 2);
        assert_eq!(config.snapshot_delay_ms, 1000);
    }

    #[test]
    fn test_backoff_is_linear_in_attempt() {
        let config = RealtimeConfig::default();
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_backoff(2), Duration::from_secs(4));
        assert_eq!(config.reconnect_backoff(5), Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_zero_connect_timeout() {
        let config = RealtimeConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_reconnect_attempts() {
        let config = RealtimeConfig {
            reconnect_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_backoff_step() {
        let config = RealtimeConfig {
            reconnect_backoff_step_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
