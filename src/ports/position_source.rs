//! PositionSource port - Interface to the device's continuous
//! position-reporting capability.
//!
//! The acquirer above this port owns retry policy and sample
//! normalization; a source only starts/cancels a watch and forwards what
//! the hardware says, including its failures.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::telemetry::RawFix;

/// Geolocation failure taxonomy.
///
/// `Timeout` is transient: position watches keep running through it, and
/// it must never end tracking on its own. The other variants are fatal to
/// the current acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied - enable location access for this app to track the bus")]
    PermissionDenied,

    #[error("position unavailable - check that device location services are switched on")]
    PositionUnavailable,

    #[error("timed out waiting for a position fix")]
    Timeout,

    #[error("no retries left: tracking failed {max} times")]
    RetriesExhausted { max: u32 },

    #[error("acquisition is already running")]
    AlreadyRunning,
}

impl GeolocationError {
    /// Whether this error ends the current acquisition.
    ///
    /// Timeouts are expected on weak-signal mobile networks and must not
    /// cancel tracking.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GeolocationError::Timeout)
    }
}

/// Tuning for a position watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionOptions {
    /// Request the highest accuracy the device offers.
    pub high_accuracy: bool,

    /// How long the device may take to produce a single fix.
    pub fix_timeout: Duration,

    /// Maximum acceptable age of a cached fix.
    pub max_fix_age: Duration,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            fix_timeout: Duration::from_secs(30),
            max_fix_age: Duration::from_secs(5),
        }
    }
}

/// One report from a running watch: a fix or a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceReport {
    Fix(RawFix),
    Error(GeolocationError),
}

/// A running position watch.
///
/// Dropping the watch cancels the underlying acquisition task, so no
/// report is delivered after the owner lets go of it.
pub struct PositionWatch {
    reports: mpsc::Receiver<SourceReport>,
    task: Option<JoinHandle<()>>,
}

impl PositionWatch {
    /// Wraps a report channel and the task feeding it.
    pub fn new(reports: mpsc::Receiver<SourceReport>, task: Option<JoinHandle<()>>) -> Self {
        Self { reports, task }
    }

    /// Waits for the next report; `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<SourceReport> {
        self.reports.recv().await
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Port for the device capability that streams raw position fixes.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Begins a fresh watch. Each call is a new acquisition, never a
    /// resume of an earlier one.
    async fn watch(&self, options: AcquisitionOptions) -> Result<PositionWatch, GeolocationError>;
}
