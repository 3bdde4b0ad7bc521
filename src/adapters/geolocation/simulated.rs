//! Simulated position source for testing.
//!
//! Replays a scripted sequence of fixes and failures. Every `watch()`
//! call replays the script from the top — a fresh acquisition, matching
//! what a real device watch does after a restart. For testing and demos
//! only; a deployment wires in a platform position source instead.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::telemetry::RawFix;
use crate::ports::{
    AcquisitionOptions, GeolocationError, PositionSource, PositionWatch, SourceReport,
};

enum Script {
    /// A finite list of reports, delivered in order.
    Fixed(Vec<SourceReport>),
    /// The same fix forever, on an interval.
    Endless { fix: RawFix, interval: Duration },
    /// Refuse to open a watch at all.
    Refuse(GeolocationError),
}

/// Position source driven by a script instead of hardware.
pub struct SimulatedPositionSource {
    script: Script,
}

impl SimulatedPositionSource {
    /// Replays the given reports, in order, on every watch.
    pub fn with_script(reports: Vec<SourceReport>) -> Self {
        Self {
            script: Script::Fixed(reports),
        }
    }

    /// Repeats one fix forever on the given interval.
    pub fn endless(fix: RawFix, interval: Duration) -> Self {
        Self {
            script: Script::Endless { fix, interval },
        }
    }

    /// Fails every watch attempt with the given error.
    pub fn refusing(error: GeolocationError) -> Self {
        Self {
            script: Script::Refuse(error),
        }
    }
}

#[async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn watch(&self, _options: AcquisitionOptions) -> Result<PositionWatch, GeolocationError> {
        match &self.script {
            Script::Refuse(error) => Err(error.clone()),
            Script::Fixed(reports) => {
                let reports = reports.clone();
                let (tx, rx) = mpsc::channel(reports.len().max(1));
                let task = tokio::spawn(async move {
                    for report in reports {
                        if tx.send(report).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(PositionWatch::new(rx, Some(task)))
            }
            Script::Endless { fix, interval } => {
                let fix = *fix;
                let interval = *interval;
                let (tx, rx) = mpsc::channel(4);
                let task = tokio::spawn(async move {
                    loop {
                        if tx.send(SourceReport::Fix(fix)).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(interval).await;
                    }
                });
                Ok(PositionWatch::new(rx, Some(task)))
            }
        }
    }
}
