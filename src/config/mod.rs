//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `TRANSIT_PULSE_` prefix and nested values use underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use transit_pulse::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Relay running on {}", config.server.socket_addr());
//! ```

mod error;
mod geolocation;
mod realtime;
mod server;

pub use error::{ConfigError, ValidationError};
pub use geolocation::GeolocationConfig;
pub use realtime::RealtimeConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for Transit Pulse.
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Relay server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime session configuration (timeouts, reconnection policy)
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Geolocation acquisition configuration
    #[serde(default)]
    pub geolocation: GeolocationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `TRANSIT_PULSE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `TRANSIT_PULSE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `TRANSIT_PULSE__REALTIME__CONNECT_TIMEOUT_SECS=10` -> `realtime.connect_timeout_secs = 10`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("TRANSIT_PULSE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.realtime.validate()?;
        self.geolocation.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
