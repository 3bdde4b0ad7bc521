//! Long-poll fallback endpoints.
//!
//! Mirrors the WebSocket protocol for clients whose network will not
//! carry an upgrade: open a session, POST frames to emit, GET to drain
//! the outbox (held open for a poll window when empty), DELETE to close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use uuid::Uuid;

use crate::domain::protocol::{ClientEvent, ServerEvent};

use super::connection::RelayConnection;
use super::ws::RelayState;

/// How long an empty poll is held open before returning an empty batch.
const POLL_WINDOW: Duration = Duration::from_secs(25);

struct PollSession {
    connection: Arc<Mutex<RelayConnection>>,
    outbox: Arc<Mutex<mpsc::UnboundedReceiver<ServerEvent>>>,
}

/// Registry of open long-poll sessions.
#[derive(Default)]
pub struct PollSessions {
    sessions: Mutex<HashMap<Uuid, PollSession>>,
}

impl PollSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open sessions.
    pub async fn open_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOpened {
    client_id: Uuid,
}

/// `POST /realtime/poll` — opens a poll session.
pub async fn open_session(State(state): State<RelayState>) -> Json<SessionOpened> {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let connection =
        RelayConnection::new(state.registry.clone(), state.tokens.clone(), outbox_tx);

    let client_id = Uuid::new_v4();
    state.polls.sessions.lock().await.insert(
        client_id,
        PollSession {
            connection: Arc::new(Mutex::new(connection)),
            outbox: Arc::new(Mutex::new(outbox_rx)),
        },
    );
    tracing::debug!(%client_id, "poll session opened");
    Json(SessionOpened { client_id })
}

/// `POST /realtime/poll/:client_id/emit` — one frame from the client.
pub async fn emit_event(
    State(state): State<RelayState>,
    Path(client_id): Path<Uuid>,
    Json(event): Json<ClientEvent>,
) -> StatusCode {
    let connection = {
        let sessions = state.polls.sessions.lock().await;
        match sessions.get(&client_id) {
            Some(session) => Arc::clone(&session.connection),
            None => return StatusCode::NOT_FOUND,
        }
    };
    connection.lock().await.handle(event).await;
    StatusCode::NO_CONTENT
}

/// `GET /realtime/poll/:client_id` — drains the outbox, waiting up to the
/// poll window when it is empty.
pub async fn poll_events(
    State(state): State<RelayState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Vec<ServerEvent>>, StatusCode> {
    let outbox = {
        let sessions = state.polls.sessions.lock().await;
        match sessions.get(&client_id) {
            Some(session) => Arc::clone(&session.outbox),
            None => return Err(StatusCode::NOT_FOUND),
        }
    };

    let mut outbox = outbox.lock().await;
    let mut batch = Vec::new();
    match timeout(POLL_WINDOW, outbox.recv()).await {
        Ok(Some(event)) => {
            batch.push(event);
            while let Ok(event) = outbox.try_recv() {
                batch.push(event);
            }
        }
        // Connection gone, or the window elapsed with nothing to say.
        Ok(None) | Err(_) => {}
    }
    Ok(Json(batch))
}

/// `DELETE /realtime/poll/:client_id` — closes the session.
pub async fn close_session(
    State(state): State<RelayState>,
    Path(client_id): Path<Uuid>,
) -> StatusCode {
    let session = state.polls.sessions.lock().await.remove(&client_id);
    match session {
        Some(session) => {
            session.connection.lock().await.close().await;
            tracing::debug!(%client_id, "poll session closed");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}
