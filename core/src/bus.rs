// Message bus implementation
//
// Both transports publish normalized messages here; UI listeners subscribe to
// the bus, never to a specific transport.
use crate::message::{RealtimeMessage, StreamTopic};
use crate::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Listener trait
///
/// Invoked synchronously from the dispatch loop, so implementations should
/// only project the message onto UI state and return.
pub trait Listener: Send + Sync {
    fn on_message(&self, message: &RealtimeMessage) -> Result<()>;
}

impl<F> Listener for F
where
    F: Fn(&RealtimeMessage) -> Result<()> + Send + Sync,
{
    fn on_message(&self, message: &RealtimeMessage) -> Result<()> {
        self(message)
    }
}

/// Bus statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub listener_errors: u64,
    pub active_listeners: usize,
}

/// Message bus core implementation
#[derive(Default)]
pub struct MessageBus {
    // Topic -> listeners in registration order
    listeners: DashMap<StreamTopic, Vec<Arc<dyn Listener>>>,

    // Statistics
    stats: DashMap<StreamTopic, BusStats>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` when the same listener (by
    /// identity) is already registered for the topic.
    pub fn subscribe(&self, topic: StreamTopic, listener: Arc<dyn Listener>) -> bool {
        let mut entry = self.listeners.entry(topic).or_default();
        if entry.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            debug!(target: "bus", topic = %topic, "Listener already registered");
            return false;
        }
        entry.push(listener);
        let count = entry.len();
        drop(entry);

        self.update_stats(&topic, |stats| stats.active_listeners = count);
        info!(target: "bus", topic = %topic, listeners = count, "Registered listener");
        true
    }

    /// Remove a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, topic: &StreamTopic, listener: &Arc<dyn Listener>) -> bool {
        let Some(mut entry) = self.listeners.get_mut(topic) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|existing| !Arc::ptr_eq(existing, listener));
        let count = entry.len();
        drop(entry);

        self.update_stats(topic, |stats| stats.active_listeners = count);
        if count != before {
            info!(target: "bus", topic = %topic, listeners = count, "Unregistered listener");
        }
        count != before
    }

    pub fn listener_count(&self, topic: &StreamTopic) -> usize {
        self.listeners.get(topic).map(|l| l.len()).unwrap_or(0)
    }

    /// Drop every listener on every topic.
    pub fn clear(&self) {
        self.listeners.clear();
        for mut stats in self.stats.iter_mut() {
            stats.active_listeners = 0;
        }
    }

    /// Deliver a message to every listener of `topic`, in registration order.
    ///
    /// A listener that fails or panics is logged and skipped; the remaining
    /// listeners still run. Returns the number of successful deliveries.
    pub fn publish(&self, topic: &StreamTopic, message: &RealtimeMessage) -> usize {
        // Snapshot so listeners may (un)subscribe re-entrantly
        let listeners: Vec<Arc<dyn Listener>> = self
            .listeners
            .get(topic)
            .map(|l| l.value().clone())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut failed = 0;
        for listener in &listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    error!(target: "bus", topic = %topic, kind = %message.kind, error = %e, "Listener failed");
                }
                Err(_) => {
                    failed += 1;
                    error!(target: "bus", topic = %topic, kind = %message.kind, "Listener panicked");
                }
            }
        }

        self.update_stats(topic, |stats| {
            stats.total_published += 1;
            stats.total_delivered += delivered as u64;
            stats.listener_errors += failed;
        });
        debug!(target: "bus", topic = %topic, kind = %message.kind, delivered, "Published message");
        delivered
    }

    /// Get stats
    pub fn get_stats(&self, topic: &StreamTopic) -> Option<BusStats> {
        self.stats.get(topic).map(|s| s.clone())
    }

    fn update_stats<F>(&self, topic: &StreamTopic, f: F)
    where
        F: FnOnce(&mut BusStats),
    {
        f(self.stats.entry(*topic).or_default().value_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use crate::transport::TransportKind;
    use crate::TagumError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notification() -> RealtimeMessage {
        RealtimeMessage::new(
            MessageKind::Notification,
            TransportKind::Sse,
            json!({"type": "notification"}),
        )
    }

    #[test]
    fn failing_listeners_do_not_stop_siblings() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let panicking: Arc<dyn Listener> =
            Arc::new(|_: &RealtimeMessage| -> Result<()> { panic!("boom") });
        let erroring: Arc<dyn Listener> = Arc::new(|_: &RealtimeMessage| -> Result<()> {
            Err(TagumError::Listener("bad state".into()))
        });
        let counter = hits.clone();
        let counting: Arc<dyn Listener> = Arc::new(move |_: &RealtimeMessage| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.subscribe(StreamTopic::Notifications, panicking);
        bus.subscribe(StreamTopic::Notifications, erroring);
        bus.subscribe(StreamTopic::Notifications, counting);

        let delivered = bus.publish(&StreamTopic::Notifications, &notification());
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let stats = bus.get_stats(&StreamTopic::Notifications).unwrap();
        assert_eq!(stats.listener_errors, 2);
        assert_eq!(stats.active_listeners, 3);
    }

    #[test]
    fn subscribe_is_idempotent_per_listener() {
        let bus = MessageBus::new();
        let listener: Arc<dyn Listener> = Arc::new(|_: &RealtimeMessage| -> Result<()> { Ok(()) });

        assert!(bus.subscribe(StreamTopic::Dashboard, listener.clone()));
        assert!(!bus.subscribe(StreamTopic::Dashboard, listener.clone()));
        assert_eq!(bus.listener_count(&StreamTopic::Dashboard), 1);

        assert!(bus.unsubscribe(&StreamTopic::Dashboard, &listener));
        assert!(!bus.unsubscribe(&StreamTopic::Dashboard, &listener));
        assert_eq!(bus.listener_count(&StreamTopic::Dashboard), 0);
    }
}
