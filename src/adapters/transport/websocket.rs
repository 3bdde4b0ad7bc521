//! WebSocket transport — the preferred, low-latency wire.
//!
//! Thin client over `tokio-tungstenite`: frames are JSON text messages,
//! protocol pings/pongs are left to the library.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::ports::{Transport, TransportConnector, TransportError, TransportKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established WebSocket connection to the relay.
pub struct WebSocketTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let json = serde_json::to_string(&event)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<ServerEvent, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| TransportError::Decode(e.to_string())),
                    );
                }
                Ok(Message::Binary(_)) => {
                    return Some(Err(TransportError::Decode(
                        "unexpected binary frame".to_string(),
                    )));
                }
                // Control frames are handled by tungstenite.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Connects WebSocket transports to a fixed relay URL.
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Creates a connector for a `ws://` or `wss://` relay endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!(url = %self.url, "websocket transport established");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}
