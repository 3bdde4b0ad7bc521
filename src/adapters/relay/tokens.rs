//! In-memory activation token store.
//!
//! The bus-activation REST call (outside this crate) mints a short
//! numeric one-time code for a driver; the relay consumes it during the
//! identification handshake. A consumed code never validates again.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::domain::foundation::BusId;
use crate::ports::ActivationTokenValidator;

/// Token store backed by a process-local map.
#[derive(Default)]
pub struct InMemoryActivationTokens {
    codes: Mutex<HashMap<String, BusId>>,
}

impl InMemoryActivationTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a six-digit one-time code bound to a bus.
    pub fn mint(&self, bus_id: &BusId) -> String {
        let seed = u32::from_be_bytes(
            Uuid::new_v4().as_bytes()[..4]
                .try_into()
                .expect("uuid has at least four bytes"),
        );
        let code = format!("{:06}", 100_000 + seed % 900_000);
        self.codes
            .lock()
            .expect("token store lock poisoned")
            .insert(code.clone(), bus_id.clone());
        code
    }

    /// Seeds a known code (for tests and fixtures).
    pub fn insert(&self, code: impl Into<String>, bus_id: BusId) {
        self.codes
            .lock()
            .expect("token store lock poisoned")
            .insert(code.into(), bus_id);
    }

    /// Number of outstanding codes.
    pub fn outstanding(&self) -> usize {
        self.codes.lock().expect("token store lock poisoned").len()
    }
}

impl ActivationTokenValidator for InMemoryActivationTokens {
    fn consume(&self, code: &str, bus_id: &BusId) -> bool {
        let mut codes = self.codes.lock().expect("token store lock poisoned");
        match codes.get(code) {
            Some(minted_for) if minted_for == bus_id => {
                codes.remove(code);
                true
            }
            // A code presented for the wrong bus stays outstanding.
            _ => false,
        }
    }
}
