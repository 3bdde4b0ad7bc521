//! Listener registry: typed topic → ordered subscribers.
//!
//! Decouples wire events from their consumers. Multiple independent
//! subscribers can sit on one topic (a UI component plus diagnostics);
//! dispatch order is subscription order, and a failing subscriber never
//! blocks delivery to the ones behind it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::topics::{SessionEvent, Topic};

/// Error a listener may report; logged and otherwise ignored by dispatch.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// A subscriber callback.
pub type Listener = Arc<dyn Fn(&SessionEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Handle identifying one registration, for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    topics: HashMap<Topic, Vec<Registration>>,
}

/// Topic-keyed subscriber registry with FIFO dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener; it stays registered until removed.
    pub fn on(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        self.register(topic, listener, false)
    }

    /// Subscribes a listener that deregisters itself after its first
    /// dispatch, before the callback runs, so it can never fire twice.
    pub fn once(&self, topic: Topic, listener: Listener) -> SubscriptionId {
        self.register(topic, listener, true)
    }

    fn register(&self, topic: Topic, listener: Listener, once: bool) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.topics.entry(topic).or_default().push(Registration {
            id,
            once,
            listener,
        });
        id
    }

    /// Bulk unsubscribe: removes every listener on the topic.
    pub fn off(&self, topic: Topic) {
        self.lock().topics.remove(&topic);
    }

    /// Removes a single registration; the others on the topic keep their
    /// relative order. Returns whether anything was removed.
    pub fn off_subscription(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        for registrations in inner.topics.values_mut() {
            if let Some(index) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(index);
                return true;
            }
        }
        false
    }

    /// Empties the registry. Nothing registered before this call will be
    /// dispatched after it returns.
    pub fn clear(&self) {
        self.lock().topics.clear();
    }

    /// Number of listeners currently on a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().topics.get(&topic).map_or(0, Vec::len)
    }

    /// Delivers an event to every listener on its topic, FIFO by
    /// subscription order. One-shot listeners are deregistered before
    /// their callback runs; a listener removed by an earlier callback in
    /// the same batch is skipped.
    pub fn dispatch(&self, event: &SessionEvent) {
        let topic = event.topic();
        let batch: Vec<Registration> = {
            let mut inner = self.lock();
            match inner.topics.get_mut(&topic) {
                Some(registrations) => {
                    let batch = registrations.clone();
                    registrations.retain(|r| !r.once);
                    batch
                }
                None => return,
            }
        };

        for registration in batch {
            if !registration.once && !self.is_registered(registration.id) {
                continue;
            }
            if let Err(error) = (registration.listener)(event) {
                tracing::warn!(?topic, %error, "session listener failed; continuing dispatch");
            }
        }
    }

    fn is_registered(&self, id: SubscriptionId) -> bool {
        self.lock()
            .topics
            .values()
            .any(|registrations| registrations.iter().any(|r| r.id == id))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("listener registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TransportKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected() -> SessionEvent {
        SessionEvent::Connected {
            transport: TransportKind::WebSocket,
        }
    }

    fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn dispatch_invokes_all_subscribers_in_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.on(
                Topic::Connect,
                Arc::new(move |_| {
                    order.lock().unwrap().push(label);
                    Ok(())
                }),
            );
        }

        registry.dispatch(&connected());

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn off_clears_whole_topic() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));
        registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));

        registry.off(Topic::Connect);
        registry.dispatch(&connected());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscriber_count(Topic::Connect), 0);
    }

    #[test]
    fn off_subscription_removes_only_the_target() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut ids = Vec::new();
        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            ids.push(registry.on(
                Topic::Connect,
                Arc::new(move |_| {
                    order.lock().unwrap().push(label);
                    Ok(())
                }),
            ));
        }

        assert!(registry.off_subscription(ids[1]));
        registry.dispatch(&connected());

        // Survivors keep their FIFO order.
        assert_eq!(*order.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn removed_listener_is_never_invoked_again() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));

        registry.dispatch(&connected());
        registry.off_subscription(id);
        registry.dispatch(&connected());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_fires_exactly_once() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.once(Topic::IdentifySuccess, counting_listener(Arc::clone(&counter)));

        let event = SessionEvent::Wire(crate::domain::protocol::ServerEvent::IdentifySuccess);
        registry.dispatch(&event);
        registry.dispatch(&event);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(Topic::IdentifySuccess), 0);
    }

    #[test]
    fn failing_listener_does_not_block_later_ones() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.on(Topic::Connect, Arc::new(|_| Err("boom".into())));
        registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));

        registry.dispatch(&connected());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_removed_mid_batch_is_skipped() {
        let registry = Arc::new(ListenerRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));

        // First listener removes the second before it runs.
        let second_id = Arc::new(Mutex::new(None));
        {
            let registry = Arc::clone(&registry);
            let second_id = Arc::clone(&second_id);
            registry.clone().on(
                Topic::Connect,
                Arc::new(move |_| {
                    if let Some(id) = *second_id.lock().unwrap() {
                        registry.off_subscription(id);
                    }
                    Ok(())
                }),
            );
        }
        let id = registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));
        *second_id.lock().unwrap() = Some(id);

        registry.dispatch(&connected());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_stops_all_dispatch() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.on(Topic::Connect, counting_listener(Arc::clone(&counter)));
        registry.once(Topic::Disconnect, counting_listener(Arc::clone(&counter)));

        registry.clear();
        registry.dispatch(&connected());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
