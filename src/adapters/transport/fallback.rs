//! Transport preference order: WebSocket first, long-polling second.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{Transport, TransportConnector, TransportError};

use super::polling::PollingConnector;
use super::websocket::WebSocketConnector;

/// Tries the preferred connector, falling back to the secondary when the
/// preferred one cannot establish a connection.
pub struct FallbackConnector {
    preferred: Arc<dyn TransportConnector>,
    fallback: Arc<dyn TransportConnector>,
}

impl FallbackConnector {
    pub fn new(
        preferred: Arc<dyn TransportConnector>,
        fallback: Arc<dyn TransportConnector>,
    ) -> Self {
        Self {
            preferred,
            fallback,
        }
    }

    /// Standard pairing for a relay base URL: WebSocket upgrade on
    /// `/realtime`, long-polling against the same host.
    pub fn for_relay(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let ws_url = format!("{}/realtime", to_ws_scheme(base));
        Self::new(
            Arc::new(WebSocketConnector::new(ws_url)),
            Arc::new(PollingConnector::new(base)),
        )
    }
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

#[async_trait]
impl TransportConnector for FallbackConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self.preferred.connect().await {
            Ok(transport) => Ok(transport),
            Err(error) => {
                tracing::warn!(%error, "preferred transport failed; trying fallback");
                self.fallback.connect().await
            }
        }
    }
}
