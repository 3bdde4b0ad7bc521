//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Connect timeout must be between 1 and 120 seconds")]
    InvalidConnectTimeout,

    #[error("Identify timeout must be between 1 and 120 seconds")]
    InvalidIdentifyTimeout,

    #[error("Reconnect attempt ceiling must be between 1 and 20")]
    InvalidReconnectCeiling,

    #[error("Reconnect backoff step must be non-zero")]
    InvalidBackoffStep,

    #[error("Room channel capacity must be non-zero")]
    InvalidRoomCapacity,

    #[error("Position fix timeout must be non-zero")]
    InvalidFixTimeout,

    #[error("Manual retry ceiling must be between 1 and 10")]
    InvalidRetryCeiling,
}
