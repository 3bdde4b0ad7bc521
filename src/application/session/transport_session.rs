//! Transport session: one persistent connection to the tracking relay.
//!
//! Owns the connection lifecycle (connect, reconnect with backoff,
//! disconnect) and the listener registry that decouples wire events from
//! their consumers. One session per process, constructed explicitly and
//! shared by every consumer (driver page, passenger page, diagnostics);
//! it survives UI navigation and is only torn down by `disconnect()`.
//!
//! A single pump task owns the transport: outgoing frames arrive over an
//! internal channel, incoming frames are decoded and dispatched through
//! the registry. Callers never touch the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::RealtimeConfig;
use crate::domain::foundation::{ConnectionState, Role, StateMachine};
use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::ports::{Transport, TransportConnector, TransportError};

use super::error::RealtimeError;
use super::registry::ListenerRegistry;
use super::topics::{DisconnectReason, SessionEvent};

const POISONED: &str = "transport session lock poisoned";

/// Handle to the process-wide realtime session. Cheap to clone; all
/// clones share one connection and one listener registry.
#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    config: RealtimeConfig,
    connector: Arc<dyn TransportConnector>,
    registry: ListenerRegistry,
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by `disconnect()`; a pump observing a stale generation must
    /// exit without dispatching anything.
    generation: AtomicU64,
}

impl TransportSession {
    /// Creates a disconnected session over the given connector.
    pub fn new(connector: Arc<dyn TransportConnector>, config: RealtimeConfig) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                config,
                connector,
                registry: ListenerRegistry::new(),
                state: Mutex::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                pump: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// The listener registry for this session.
    pub fn events(&self) -> &ListenerRegistry {
        &self.shared.registry
    }

    /// The session configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.shared.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().expect(POISONED)
    }

    /// The role bound by the handshake, if identified.
    pub fn role(&self) -> Option<Role> {
        self.state().role()
    }

    /// True while a live transport is attached.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Opens the transport. Idempotent: a session that is already
    /// connected (or mid-connect) resolves immediately.
    ///
    /// # Errors
    ///
    /// `ConnectTimeout` after the configured window, or the underlying
    /// transport failure. Both leave the session `Disconnected`.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        {
            let mut state = self.shared.state.lock().expect(POISONED);
            if state.is_connected() || *state == ConnectionState::Connecting {
                return Ok(());
            }
            *state = state.transition_to(ConnectionState::Connecting)?;
        }

        let connected = timeout(
            self.shared.config.connect_timeout(),
            self.shared.connector.connect(),
        )
        .await;

        let transport = match connected {
            Err(_) => {
                self.force_state(ConnectionState::Disconnected);
                return Err(RealtimeError::ConnectTimeout);
            }
            Ok(Err(error)) => {
                self.force_state(ConnectionState::Disconnected);
                return Err(RealtimeError::Transport(error));
            }
            Ok(Ok(transport)) => transport,
        };

        let kind = transport.kind();
        self.attach(transport);
        tracing::info!(transport = %kind, "realtime session connected");
        self.shared
            .registry
            .dispatch(&SessionEvent::Connected { transport: kind });
        Ok(())
    }

    /// Queues one frame for the relay.
    ///
    /// Fire-and-forget: no ack is awaited, so a slow network queues frames
    /// at the transport layer and the newest sample wins on arrival.
    ///
    /// # Errors
    ///
    /// `NotConnected` when no transport handle is attached. Nothing is
    /// queued for later in that case; the caller decides whether to retry.
    pub fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        let outbound = self.shared.outbound.lock().expect(POISONED);
        match outbound.as_ref() {
            Some(sender) => sender
                .send(event)
                .map_err(|_| RealtimeError::NotConnected),
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Binds the handshake result to the connection.
    ///
    /// Role transitions are monotonic: once identified, a second
    /// identification attempt is rejected without touching role state.
    pub fn mark_identified(&self, role: Role) -> Result<(), RealtimeError> {
        let mut state = self.shared.state.lock().expect(POISONED);
        if let Some(existing) = state.role() {
            return Err(RealtimeError::AlreadyIdentified { role: existing });
        }
        if !state.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        *state = state.transition_to(ConnectionState::Identified(role))?;
        Ok(())
    }

    /// Full teardown: closes the transport, clears the listener registry,
    /// resets role state. No listener is dispatched after this returns.
    pub async fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        *self.shared.outbound.lock().expect(POISONED) = None;
        self.force_state(ConnectionState::Disconnected);
        self.shared.registry.clear();

        let pump = self.shared.pump.lock().expect(POISONED).take();
        if let Some(pump) = pump {
            pump.abort();
            let _ = pump.await;
        }
        tracing::info!("realtime session disconnected");
    }

    fn attach(&self, transport: Box<dyn Transport>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.shared.outbound.lock().expect(POISONED) = Some(sender);
        self.force_state(ConnectionState::Connected);

        let generation = self.shared.generation.load(Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let pump = tokio::spawn(run_pump(shared, transport, receiver, generation));
        *self.shared.pump.lock().expect(POISONED) = Some(pump);
    }

    fn force_state(&self, state: ConnectionState) {
        *self.shared.state.lock().expect(POISONED) = state;
    }
}

impl SessionShared {
    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn force_state(&self, state: ConnectionState) {
        *self.state.lock().expect(POISONED) = state;
    }
}

enum PumpStep {
    Outgoing(Option<ClientEvent>),
    Incoming(Option<Result<ServerEvent, TransportError>>),
}

/// Drives one transport until it is lost or torn down, reconnecting with
/// linear backoff on unexpected loss.
async fn run_pump(
    shared: Arc<SessionShared>,
    mut transport: Box<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    generation: u64,
) {
    loop {
        let lost = pump_frames(&shared, transport.as_mut(), &mut outbound, generation).await;
        if !lost {
            transport.close().await;
            return;
        }
        if shared.is_stale(generation) {
            return;
        }

        // No transport handle while reconnecting: emits fail loudly
        // instead of queueing into a connection that may never come back.
        *shared.outbound.lock().expect(POISONED) = None;
        shared.force_state(ConnectionState::Connecting);
        shared.registry.dispatch(&SessionEvent::Disconnected {
            reason: DisconnectReason::TransportLost,
        });

        match reconnect(&shared, generation).await {
            Some((fresh, attempt)) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                *shared.outbound.lock().expect(POISONED) = Some(sender);
                outbound = receiver;
                shared.force_state(ConnectionState::Connected);
                shared
                    .registry
                    .dispatch(&SessionEvent::Reconnected { attempt });
                transport = fresh;
            }
            None => {
                if shared.is_stale(generation) {
                    return;
                }
                *shared.outbound.lock().expect(POISONED) = None;
                shared.force_state(ConnectionState::Disconnected);
                tracing::error!("reconnection attempts exhausted; session is down");
                shared.registry.dispatch(&SessionEvent::Disconnected {
                    reason: DisconnectReason::RetriesExhausted,
                });
                return;
            }
        }
    }
}

/// Pumps frames both ways. Returns `true` if the transport was lost
/// unexpectedly, `false` on explicit teardown.
async fn pump_frames(
    shared: &Arc<SessionShared>,
    transport: &mut dyn Transport,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    generation: u64,
) -> bool {
    loop {
        let step = tokio::select! {
            frame = outbound.recv() => PumpStep::Outgoing(frame),
            frame = transport.recv() => PumpStep::Incoming(frame),
        };

        match step {
            PumpStep::Outgoing(Some(event)) => {
                if let Err(error) = transport.send(event).await {
                    tracing::warn!(%error, "send failed; treating transport as lost");
                    return true;
                }
            }
            // Sender dropped: explicit teardown.
            PumpStep::Outgoing(None) => return false,
            PumpStep::Incoming(Some(Ok(event))) => {
                if shared.is_stale(generation) {
                    return false;
                }
                shared.registry.dispatch(&SessionEvent::Wire(event));
            }
            PumpStep::Incoming(Some(Err(error))) => {
                tracing::warn!(%error, "receive failed; treating transport as lost");
                return true;
            }
            PumpStep::Incoming(None) => {
                tracing::warn!("transport closed by peer");
                return true;
            }
        }
    }
}

/// Retries the connector with linearly increasing backoff (attempt × step)
/// up to the configured ceiling. The attempt counter restarts from zero
/// after every successful reconnect.
async fn reconnect(
    shared: &Arc<SessionShared>,
    generation: u64,
) -> Option<(Box<dyn Transport>, u32)> {
    let ceiling = shared.config.reconnect_max_attempts;
    for attempt in 1..=ceiling {
        tokio::time::sleep(shared.config.reconnect_backoff(attempt)).await;
        if shared.is_stale(generation) {
            return None;
        }
        match timeout(shared.config.connect_timeout(), shared.connector.connect()).await {
            Ok(Ok(transport)) => {
                tracing::info!(attempt, "transport reconnected");
                return Some((transport, attempt));
            }
            Ok(Err(error)) => {
                tracing::warn!(attempt, ceiling, %error, "reconnect attempt failed");
            }
            Err(_) => {
                tracing::warn!(attempt, ceiling, "reconnect attempt timed out");
            }
        }
    }
    None
}
