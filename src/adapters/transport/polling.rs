//! Long-polling transport — the higher-latency fallback.
//!
//! For networks and proxies that refuse WebSocket upgrades. The relay
//! keeps a per-client outbox; this adapter opens a poll session, emits
//! frames with plain POSTs, and runs a background loop of long GET polls
//! feeding an internal channel so `recv` stays cancel-safe.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::protocol::{ClientEvent, ServerEvent};
use crate::ports::{Transport, TransportConnector, TransportError, TransportKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollSessionOpened {
    client_id: String,
}

/// An established long-polling session.
pub struct LongPollingTransport {
    http: reqwest::Client,
    emit_url: String,
    close_url: String,
    events: mpsc::Receiver<Result<ServerEvent, TransportError>>,
    poller: Option<JoinHandle<()>>,
}

#[async_trait]
impl Transport for LongPollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPolling
    }

    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        let response = self
            .http
            .post(&self.emit_url)
            .json(&event)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::SendFailed(format!(
                "relay answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerEvent, TransportError>> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        // Best-effort: tell the relay to drop the poll session.
        let _ = self.http.delete(&self.close_url).send().await;
    }
}

impl Drop for LongPollingTransport {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

async fn run_poll_loop(
    http: reqwest::Client,
    poll_url: String,
    events: mpsc::Sender<Result<ServerEvent, TransportError>>,
) {
    loop {
        let response = match http.get(&poll_url).send().await {
            Ok(response) => response,
            Err(error) => {
                let _ = events
                    .send(Err(TransportError::ReceiveFailed(error.to_string())))
                    .await;
                return;
            }
        };

        // 404: the relay dropped the session; read as a closed transport.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return;
        }
        if !response.status().is_success() {
            let _ = events
                .send(Err(TransportError::ReceiveFailed(format!(
                    "relay answered {}",
                    response.status()
                ))))
                .await;
            return;
        }

        let batch: Vec<ServerEvent> = match response.json().await {
            Ok(batch) => batch,
            Err(error) => {
                let _ = events
                    .send(Err(TransportError::Decode(error.to_string())))
                    .await;
                return;
            }
        };

        for event in batch {
            if events.send(Ok(event)).await.is_err() {
                return; // consumer gone
            }
        }
    }
}

/// Opens long-polling sessions against the relay's poll endpoints.
pub struct PollingConnector {
    http: reqwest::Client,
    base_url: String,
}

impl PollingConnector {
    /// Creates a connector for an `http://` or `https://` relay base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TransportConnector for PollingConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let open_url = format!("{}/realtime/poll", self.base_url);
        let response = self
            .http
            .post(&open_url)
            .send()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::ConnectFailed(format!(
                "relay answered {}",
                response.status()
            )));
        }
        let opened: PollSessionOpened = response
            .json()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let session_url = format!("{}/realtime/poll/{}", self.base_url, opened.client_id);
        let (events_tx, events_rx) = mpsc::channel(64);
        let poller = tokio::spawn(run_poll_loop(
            self.http.clone(),
            session_url.clone(),
            events_tx,
        ));

        tracing::debug!(client_id = %opened.client_id, "long-polling transport established");
        Ok(Box::new(LongPollingTransport {
            http: self.http.clone(),
            emit_url: format!("{}/emit", session_url),
            close_url: session_url,
            events: events_rx,
            poller: Some(poller),
        }))
    }
}
