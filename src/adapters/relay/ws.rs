//! WebSocket endpoint for realtime clients.
//!
//! Handles the HTTP → WebSocket upgrade and runs the connection:
//! 1. Upgrade to WebSocket
//! 2. Feed decoded client frames into the protocol machine
//! 3. Drain the connection outbox back to the socket
//! 4. Tear down room state on disconnect

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::protocol::ClientEvent;
use crate::ports::ActivationTokenValidator;

use super::connection::RelayConnection;
use super::polling::{self, PollSessions};
use super::rooms::RoomRegistry;

/// State shared by every relay endpoint.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<RoomRegistry>,
    pub tokens: Arc<dyn ActivationTokenValidator>,
    pub polls: Arc<PollSessions>,
}

impl RelayState {
    pub fn new(registry: Arc<RoomRegistry>, tokens: Arc<dyn ActivationTokenValidator>) -> Self {
        Self {
            registry,
            tokens,
            polls: Arc::new(PollSessions::new()),
        }
    }
}

/// Routes for the realtime surface: the WebSocket upgrade and the
/// long-poll fallback endpoints.
pub fn realtime_router() -> axum::Router<RelayState> {
    axum::Router::new()
        .route("/realtime", get(ws_handler))
        .route("/realtime/poll", post(polling::open_session))
        .route(
            "/realtime/poll/:client_id",
            get(polling::poll_events).delete(polling::close_session),
        )
        .route("/realtime/poll/:client_id/emit", post(polling::emit_event))
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /realtime`
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs for the lifetime of one WebSocket connection.
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (mut sink, mut stream) = socket.split();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let mut connection =
        RelayConnection::new(state.registry.clone(), state.tokens.clone(), outbox_tx);

    // Writer task: connection outbox → socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let json = serde_json::to_string(&event)
                .expect("ServerEvent serialization should not fail");
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => connection.handle(event).await,
                Err(error) => {
                    tracing::warn!(%error, "ignoring undecodable client frame");
                }
            },
            Ok(Message::Close(_)) => break,
            // Protocol control frames are handled by axum.
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(%error, "websocket receive error");
                break;
            }
        }
    }

    connection.close().await;
    writer.abort();
}
