//! Identification handshake: binds a connection to a role.
//!
//! One-shot per connection, always the first application frame. Drivers
//! prove possession of an activation token and wait for the verdict;
//! passengers declare themselves and proceed (best-effort identity).

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::domain::foundation::{BusId, Role};
use crate::domain::protocol::{ClientEvent, IdentificationCredential, ServerEvent};

use super::error::RealtimeError;
use super::topics::{SessionEvent, Topic};
use super::transport_session::TransportSession;

type Verdict = Result<(), RealtimeError>;

/// Identifies the session as a driver for `bus_id`.
///
/// Blocks until the relay answers `identify:success` or `identify:error`,
/// observed through one-shot listeners that deregister themselves on
/// first fire (no leaks, no double resolution). The wait is bounded by
/// the configured identify timeout so a silent relay cannot hang the
/// caller. There is no automatic retry on rejection; the caller restarts
/// the whole connect sequence.
pub async fn identify_driver(
    session: &TransportSession,
    token: &str,
    bus_id: &BusId,
) -> Result<(), RealtimeError> {
    if let Some(role) = session.role() {
        return Err(RealtimeError::AlreadyIdentified { role });
    }

    let (verdict_tx, verdict_rx) = oneshot::channel::<Verdict>();
    // Success and error share one slot so only the first ack resolves.
    let slot = Arc::new(Mutex::new(Some(verdict_tx)));

    let on_success = {
        let slot = Arc::clone(&slot);
        session.events().once(
            Topic::IdentifySuccess,
            Arc::new(move |_event| {
                if let Some(tx) = slot.lock().expect("identify waiter lock poisoned").take() {
                    let _ = tx.send(Ok(()));
                }
                Ok(())
            }),
        )
    };
    let on_error = {
        let slot = Arc::clone(&slot);
        session.events().once(
            Topic::IdentifyError,
            Arc::new(move |event| {
                let message = match event {
                    SessionEvent::Wire(ServerEvent::IdentifyError { message }) => message.clone(),
                    _ => "identification rejected".to_string(),
                };
                if let Some(tx) = slot.lock().expect("identify waiter lock poisoned").take() {
                    let _ = tx.send(Err(RealtimeError::IdentifyRejected { message }));
                }
                Ok(())
            }),
        )
    };

    let credential = IdentificationCredential::Driver {
        token: token.to_string(),
        bus_id: bus_id.clone(),
    };
    if let Err(error) = session.emit(ClientEvent::Identify { credential }) {
        session.events().off_subscription(on_success);
        session.events().off_subscription(on_error);
        return Err(error);
    }

    let verdict = match timeout(session.config().identify_timeout(), verdict_rx).await {
        Err(_) => Err(RealtimeError::IdentifyTimeout),
        // Registry cleared mid-wait: the session was torn down under us.
        Ok(Err(_)) => Err(RealtimeError::NotConnected),
        Ok(Ok(verdict)) => verdict,
    };

    // Whichever one-shot did not fire (or both, on timeout) must go now.
    session.events().off_subscription(on_success);
    session.events().off_subscription(on_error);

    verdict?;
    session.mark_identified(Role::Driver)?;
    tracing::info!(bus_id = %bus_id, "identified as driver");
    Ok(())
}

/// Identifies the session as a passenger.
///
/// The relay always accepts passengers, so this does not wait for an ack
/// before room joins proceed; callers that care about late rejections
/// subscribe to `Topic::IdentifyError` separately.
pub fn identify_passenger(session: &TransportSession) -> Result<(), RealtimeError> {
    if let Some(role) = session.role() {
        return Err(RealtimeError::AlreadyIdentified { role });
    }
    session.emit(ClientEvent::Identify {
        credential: IdentificationCredential::Passenger,
    })?;
    session.mark_identified(Role::Passenger)?;
    tracing::debug!("identified as passenger");
    Ok(())
}
