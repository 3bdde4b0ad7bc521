//! Diagnostics: a passive observer of session events.
//!
//! Keeps the last few session events as human-readable lines for an
//! operator panel. Not part of the session contract: it only watches,
//! never errors, and tolerates any event shape.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::domain::foundation::Timestamp;
use crate::domain::protocol::ServerEvent;

use super::topics::{DisconnectReason, SessionEvent, Topic};
use super::transport_session::TransportSession;

/// How many entries the ring keeps.
pub const DIAGNOSTICS_CAPACITY: usize = 10;

const WATCHED_TOPICS: &[Topic] = &[
    Topic::Connect,
    Topic::Disconnect,
    Topic::Reconnected,
    Topic::IdentifySuccess,
    Topic::IdentifyError,
    Topic::DriverJoined,
    Topic::DriverError,
    Topic::LocationSent,
];

/// Bounded ring of recent session events.
#[derive(Clone)]
pub struct DiagnosticsLog {
    shared: Arc<DiagnosticsShared>,
}

struct DiagnosticsShared {
    entries: Mutex<VecDeque<String>>,
}

impl DiagnosticsLog {
    /// Subscribes to the session's operational topics and starts
    /// recording.
    pub fn attach(session: &TransportSession) -> Self {
        let shared = Arc::new(DiagnosticsShared {
            entries: Mutex::new(VecDeque::with_capacity(DIAGNOSTICS_CAPACITY)),
        });

        for &topic in WATCHED_TOPICS {
            let weak: Weak<DiagnosticsShared> = Arc::downgrade(&shared);
            session.events().on(
                topic,
                Arc::new(move |event| {
                    if let Some(shared) = weak.upgrade() {
                        shared.record(describe(event));
                    }
                    Ok(())
                }),
            );
        }

        Self { shared }
    }

    /// The recorded lines, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.shared
            .entries
            .lock()
            .expect("diagnostics lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl DiagnosticsShared {
    fn record(&self, line: String) {
        let mut entries = self.entries.lock().expect("diagnostics lock poisoned");
        if entries.len() == DIAGNOSTICS_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(line);
    }
}

fn describe(event: &SessionEvent) -> String {
    let when = Timestamp::now().to_rfc3339();
    let what = match event {
        SessionEvent::Connected { transport } => format!("connected over {transport}"),
        SessionEvent::Disconnected { reason } => match reason {
            DisconnectReason::Explicit => "disconnected".to_string(),
            DisconnectReason::TransportLost => "connection lost, reconnecting".to_string(),
            DisconnectReason::RetriesExhausted => "gave up reconnecting".to_string(),
        },
        SessionEvent::Reconnected { attempt } => {
            format!("reconnected on attempt {attempt}")
        }
        SessionEvent::Wire(ServerEvent::IdentifySuccess) => "identified".to_string(),
        SessionEvent::Wire(ServerEvent::IdentifyError { message }) => {
            format!("identification failed: {message}")
        }
        SessionEvent::Wire(ServerEvent::DriverJoined { bus_id }) => {
            format!("joined bus {bus_id}")
        }
        SessionEvent::Wire(ServerEvent::DriverError { message }) => {
            format!("driver error: {message}")
        }
        SessionEvent::Wire(ServerEvent::DriverLocationSent) => "location delivered".to_string(),
        SessionEvent::Wire(other) => format!("{other:?}"),
    };
    format!("{when} {what}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transport::ChannelConnector;
    use crate::config::RealtimeConfig;
    use crate::domain::foundation::BusId;
    use crate::ports::TransportConnector;
    use tokio::sync::mpsc;

    async fn session_with_log() -> (
        TransportSession,
        DiagnosticsLog,
        crate::adapters::transport::RelayEnd,
    ) {
        let (connector, relay) = ChannelConnector::single();
        let session = TransportSession::new(
            Arc::new(connector) as Arc<dyn TransportConnector>,
            RealtimeConfig::default(),
        );
        let log = DiagnosticsLog::attach(&session);
        (session, log, relay)
    }

    #[tokio::test]
    async fn records_connection_and_identify_events() {
        let (session, log, relay) = session_with_log().await;
        session.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.events().on(
            Topic::IdentifySuccess,
            Arc::new(move |_| {
                let _ = tx.send(());
                Ok(())
            }),
        );
        relay.send(ServerEvent::IdentifySuccess).await;
        rx.recv().await.unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("connected over websocket"));
        assert!(entries[1].contains("identified"));
    }

    #[tokio::test]
    async fn ring_is_bounded_to_capacity() {
        let (session, log, relay) = session_with_log().await;
        session.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.events().on(
            Topic::LocationSent,
            Arc::new(move |_| {
                let _ = tx.send(());
                Ok(())
            }),
        );
        for _ in 0..25 {
            relay.send(ServerEvent::DriverLocationSent).await;
            rx.recv().await.unwrap();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), DIAGNOSTICS_CAPACITY);
        // Newest entries survive.
        assert!(entries.last().unwrap().contains("location delivered"));
    }

    #[tokio::test]
    async fn tolerates_malformed_driver_events() {
        let (session, log, relay) = session_with_log().await;
        session.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.events().on(
            Topic::DriverError,
            Arc::new(move |_| {
                let _ = tx.send(());
                Ok(())
            }),
        );
        // An error event with an empty message is still just a line.
        relay
            .send(ServerEvent::DriverError {
                message: String::new(),
            })
            .await;
        rx.recv().await.unwrap();

        assert!(log.entries().iter().any(|line| line.contains("driver error")));
    }

    #[tokio::test]
    async fn entries_carry_timestamps() {
        let (session, log, relay) = session_with_log().await;
        session.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        session.events().on(
            Topic::DriverJoined,
            Arc::new(move |_| {
                let _ = tx.send(());
                Ok(())
            }),
        );
        relay
            .send(ServerEvent::DriverJoined {
                bus_id: BusId::new("BUS1").unwrap(),
            })
            .await;
        rx.recv().await.unwrap();

        let entries = log.entries();
        // RFC 3339 lines start with the year.
        assert!(entries.iter().all(|line| line.starts_with("20")));
        assert!(entries.iter().any(|line| line.contains("joined bus BUS1")));
    }
}
