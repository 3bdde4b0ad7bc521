//! Geolocation acquirer: a restartable stream of normalized samples.
//!
//! Wraps a [`PositionSource`] and owns the policy the source does not:
//! timeouts are transient and keep acquisition alive, permission and
//! availability failures are fatal, and manual retries after a fatal
//! failure are bounded. `start()` after `stop()` is always a fresh
//! acquisition, never a resume.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GeolocationConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::telemetry::LocationSample;
use crate::ports::{
    AcquisitionOptions, GeolocationError, PositionSource, PositionWatch, SourceReport,
};

const POISONED: &str = "geolocation acquirer lock poisoned";
const SAMPLE_BUFFER: usize = 16;

/// Streams normalized location samples from a position source.
#[derive(Clone)]
pub struct GeolocationAcquirer {
    shared: Arc<AcquirerShared>,
}

struct AcquirerShared {
    source: Arc<dyn PositionSource>,
    options: AcquisitionOptions,
    max_retries: u32,
    state: Mutex<AcquirerState>,
}

#[derive(Default)]
struct AcquirerState {
    running: bool,
    retries_used: u32,
    last_error: Option<GeolocationError>,
    pump: Option<JoinHandle<()>>,
}

impl GeolocationAcquirer {
    pub fn new(source: Arc<dyn PositionSource>, config: &GeolocationConfig) -> Self {
        Self {
            shared: Arc::new(AcquirerShared {
                source,
                options: AcquisitionOptions {
                    high_accuracy: config.high_accuracy,
                    fix_timeout: config.fix_timeout(),
                    max_fix_age: config.max_fix_age(),
                },
                max_retries: config.max_manual_retries,
                state: Mutex::new(AcquirerState::default()),
            }),
        }
    }

    /// Begins a fresh acquisition and returns the sample stream.
    ///
    /// The stream is infinite until a fatal source error or [`Self::stop`]
    /// ends it; the consumer sees the end as channel closure and reads the
    /// cause from [`Self::last_error`].
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while an acquisition is live, or the source's
    /// failure to open a watch.
    pub async fn start(&self) -> Result<mpsc::Receiver<LocationSample>, GeolocationError> {
        {
            let mut state = self.shared.state.lock().expect(POISONED);
            if state.running {
                return Err(GeolocationError::AlreadyRunning);
            }
            // Reserve the slot before the await below.
            state.running = true;
            state.last_error = None;
        }

        let watch = match self.shared.source.watch(self.shared.options).await {
            Ok(watch) => watch,
            Err(error) => {
                let mut state = self.shared.state.lock().expect(POISONED);
                state.running = false;
                state.last_error = Some(error.clone());
                return Err(error);
            }
        };

        let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_BUFFER);
        let shared = Arc::clone(&self.shared);
        let pump = tokio::spawn(run_acquisition(shared, watch, samples_tx));
        self.shared.state.lock().expect(POISONED).pump = Some(pump);

        tracing::info!("geolocation acquisition started");
        Ok(samples_rx)
    }

    /// One bounded manual retry after a fatal error: re-invokes
    /// [`Self::start`] and spends one retry from the budget. The budget
    /// is only refilled by an explicit [`Self::stop`].
    pub async fn retry(&self) -> Result<mpsc::Receiver<LocationSample>, GeolocationError> {
        {
            let mut state = self.shared.state.lock().expect(POISONED);
            if state.running {
                return Err(GeolocationError::AlreadyRunning);
            }
            if state.retries_used >= self.shared.max_retries {
                return Err(GeolocationError::RetriesExhausted {
                    max: self.shared.max_retries,
                });
            }
            state.retries_used += 1;
        }
        tracing::info!(
            used = self.retries_used(),
            max = self.shared.max_retries,
            "manual geolocation retry"
        );
        self.start().await
    }

    /// Cancels the acquisition. Synchronous: no sample is delivered after
    /// this returns. Resets the manual-retry budget.
    pub fn stop(&self) {
        let pump = {
            let mut state = self.shared.state.lock().expect(POISONED);
            state.running = false;
            state.retries_used = 0;
            state.pump.take()
        };
        if let Some(pump) = pump {
            // Aborting drops the watch, which cancels the source task.
            pump.abort();
        }
        tracing::info!("geolocation acquisition stopped");
    }

    /// Whether an acquisition is currently live.
    pub fn is_tracking(&self) -> bool {
        self.shared.state.lock().expect(POISONED).running
    }

    /// Manual retries spent since the last stop.
    pub fn retries_used(&self) -> u32 {
        self.shared.state.lock().expect(POISONED).retries_used
    }

    /// The retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.shared.max_retries
    }

    /// The error that ended the last acquisition, if any.
    pub fn last_error(&self) -> Option<GeolocationError> {
        self.shared.state.lock().expect(POISONED).last_error.clone()
    }
}

async fn run_acquisition(
    shared: Arc<AcquirerShared>,
    mut watch: PositionWatch,
    samples: mpsc::Sender<LocationSample>,
) {
    while let Some(report) = watch.next().await {
        match report {
            SourceReport::Fix(fix) => {
                let sample = LocationSample::from_raw(fix, Timestamp::now());
                if samples.send(sample).await.is_err() {
                    // Consumer dropped the stream.
                    break;
                }
            }
            SourceReport::Error(error) if !error.is_fatal() => {
                // Weak signal; keep going and tell no one but the log.
                tracing::warn!(%error, "transient geolocation timeout, acquisition continues");
            }
            SourceReport::Error(error) => {
                tracing::error!(%error, "geolocation acquisition failed");
                let mut state = shared.state.lock().expect(POISONED);
                state.last_error = Some(error);
                state.running = false;
                return; // dropping the sender ends the sample stream
            }
        }
    }
    shared.state.lock().expect(POISONED).running = false;
}
