//! In-memory transport for testing.
//!
//! A channel pair standing in for a real connection: the client half
//! implements [`Transport`], the far end plays the relay. Deterministic
//! and instant, for unit and integration tests only — production code
//! uses the WebSocket transport with the long-polling fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::ports::{Transport, TransportConnector, TransportError, TransportKind};

/// Client half of an in-memory connection.
pub struct ChannelTransport {
    kind: TransportKind,
    to_relay: Option<mpsc::UnboundedSender<ClientEvent>>,
    from_relay: mpsc::UnboundedReceiver<Result<ServerEvent, TransportError>>,
}

#[async_trait]
impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        match &self.to_relay {
            Some(sender) => sender.send(event).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Option<Result<ServerEvent, TransportError>> {
        self.from_relay.recv().await
    }

    async fn close(&mut self) {
        self.to_relay = None;
        self.from_relay.close();
    }
}

/// Relay half of an in-memory connection.
pub struct FarEnd {
    to_client: mpsc::UnboundedSender<Result<ServerEvent, TransportError>>,
    from_client: mpsc::UnboundedReceiver<ClientEvent>,
}

impl FarEnd {
    /// Delivers a frame to the client.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.to_client.send(Ok(event));
    }

    /// Delivers a transport-level failure to the client.
    pub fn fail(&self, error: TransportError) {
        let _ = self.to_client.send(Err(error));
    }

    /// Next frame the client emitted, `None` once the client closed.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.from_client.recv().await
    }
}

/// Creates a connected client/relay pair.
pub fn channel_pair(kind: TransportKind) -> (ChannelTransport, FarEnd) {
    let (to_relay, from_client) = mpsc::unbounded_channel();
    let (to_client, from_relay) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            kind,
            to_relay: Some(to_relay),
            from_relay,
        },
        FarEnd {
            to_client,
            from_client,
        },
    )
}

/// Shared handle to the relay half, so a test can keep talking to a
/// session across reconnects (each reconnect swaps in a fresh far end).
/// Dropping the held far end (via [`RelayEnd::close`]) reads as an
/// unexpected connection loss on the client side.
#[derive(Clone)]
pub struct RelayEnd {
    inner: Arc<Mutex<Option<FarEnd>>>,
    attached: Arc<Notify>,
}

impl RelayEnd {
    /// A handle holding no connection yet.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            attached: Arc::new(Notify::new()),
        }
    }

    /// A handle already holding a far end.
    pub fn holding(far: FarEnd) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(far))),
            attached: Arc::new(Notify::new()),
        }
    }

    /// Swaps in the far end of a fresh connection.
    pub async fn replace(&self, far: FarEnd) {
        *self.inner.lock().await = Some(far);
        self.attached.notify_waiters();
    }

    /// Drops the connection: the client sees the transport close.
    pub async fn close(&self) {
        self.inner.lock().await.take();
    }

    /// Delivers a frame to the client; no-op when unconnected.
    pub async fn send(&self, event: ServerEvent) {
        if let Some(far) = self.inner.lock().await.as_ref() {
            far.send(event);
        }
    }

    /// Delivers a transport failure to the client; no-op when unconnected.
    pub async fn fail(&self, error: TransportError) {
        if let Some(far) = self.inner.lock().await.as_ref() {
            far.fail(error);
        }
    }

    /// Next frame the client emitted. Waits for a connection to attach
    /// if none is held yet (a reconnect may be in flight).
    pub async fn recv(&self) -> Option<ClientEvent> {
        loop {
            let attached = self.attached.notified();
            {
                let mut guard = self.inner.lock().await;
                if let Some(far) = guard.as_mut() {
                    return far.recv().await;
                }
            }
            attached.await;
        }
    }
}

/// Connector handing out in-memory transports.
pub struct ChannelConnector {
    kind: TransportKind,
    mode: Mode,
    relay: RelayEnd,
}

enum Mode {
    /// One pre-built connection; later connects fail.
    Single(std::sync::Mutex<Option<ChannelTransport>>),
    /// Every connect builds a fresh pair and republishes the far end.
    Renewing,
}

impl ChannelConnector {
    /// A connector with exactly one connection to give out.
    pub fn single() -> (Self, RelayEnd) {
        let (client, far) = channel_pair(TransportKind::WebSocket);
        let relay = RelayEnd::holding(far);
        (
            Self {
                kind: TransportKind::WebSocket,
                mode: Mode::Single(std::sync::Mutex::new(Some(client))),
                relay: relay.clone(),
            },
            relay,
        )
    }

    /// A connector that succeeds on every attempt with a fresh pair,
    /// for reconnection tests.
    pub fn renewing() -> (Self, RelayEnd) {
        let relay = RelayEnd::empty();
        (
            Self {
                kind: TransportKind::WebSocket,
                mode: Mode::Renewing,
                relay: relay.clone(),
            },
            relay,
        )
    }
}

#[async_trait]
impl TransportConnector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        match &self.mode {
            Mode::Single(slot) => slot
                .lock()
                .expect("channel connector lock poisoned")
                .take()
                .map(|transport| Box::new(transport) as Box<dyn Transport>)
                .ok_or_else(|| {
                    TransportError::ConnectFailed(
                        "in-memory transport already consumed".to_string(),
                    )
                }),
            Mode::Renewing => {
                let (client, far) = channel_pair(self.kind);
                self.relay.replace(far).await;
                Ok(Box::new(client))
            }
        }
    }
}
