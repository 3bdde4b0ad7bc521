//! Transport port - Interface to the realtime wire.
//!
//! A transport moves already-typed protocol frames; framing, URLs and
//! sockets are adapter concerns. The session layer holds exactly one
//! transport at a time and never touches it from more than one task.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::protocol::{ClientEvent, ServerEvent};

/// Which concrete transport a connection ended up on.
///
/// WebSocket is preferred for latency; long-polling is the fallback for
/// networks and proxies that will not carry an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    LongPolling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::LongPolling => write!(f, "long-polling"),
        }
    }
}

/// Low-level failures below the protocol layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to establish connection: {0}")]
    ConnectFailed(String),

    #[error("failed to send frame: {0}")]
    SendFailed(String),

    #[error("failed to receive frame: {0}")]
    ReceiveFailed(String),

    #[error("could not decode wire frame: {0}")]
    Decode(String),

    #[error("transport closed")]
    Closed,
}

/// An established bidirectional connection carrying protocol frames.
#[async_trait]
pub trait Transport: Send {
    /// The concrete transport this connection runs on.
    fn kind(&self) -> TransportKind;

    /// Sends one frame to the relay.
    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError>;

    /// Receives the next frame from the relay.
    ///
    /// Returns `None` once the connection is closed; after that, every
    /// further call must also return `None`.
    async fn recv(&mut self) -> Option<Result<ServerEvent, TransportError>>;

    /// Closes the connection, flushing a close frame where the transport
    /// has one.
    async fn close(&mut self);
}

/// Factory for transports; owns endpoint addressing and fallback order.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Establishes a fresh connection.
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}
