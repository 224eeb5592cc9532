// Realtime Dispatcher
//
// SSE is the primary transport. One connection per topic, shared by every
// listener of that topic; frames are parsed and routed by their `type`.

use crate::bus::{Listener, MessageBus};
use crate::config::RealtimeConfig;
use crate::message::{route, MessageKind, RealtimeMessage, StreamTopic};
use crate::ports::ConnectionStatusPort;
use crate::transport::{
    ConnectionEvent, ConnectionHandle, ConnectionState, ConnectionUpdate, Connector, TransportKind,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct RealtimeDispatcher {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    bus: Arc<MessageBus>,
    connections: Arc<DashMap<StreamTopic, ConnectionHandle>>,
    // Terminal states of topics whose connection is gone
    states: Arc<DashMap<StreamTopic, ConnectionState>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    pump: JoinHandle<()>,
}

impl RealtimeDispatcher {
    /// Create the dispatcher and spawn its event pump. Must be called inside a
    /// Tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn Connector>,
        status_port: Arc<dyn ConnectionStatusPort>,
    ) -> Self {
        let bus = Arc::new(MessageBus::new());
        let connections = Arc::new(DashMap::new());
        let states = Arc::new(DashMap::new());
        let (events, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(pump(
            rx,
            bus.clone(),
            connections.clone(),
            states.clone(),
            status_port,
        ));

        Self {
            config,
            connector,
            bus,
            connections,
            states,
            events,
            pump,
        }
    }

    /// Shared bus; the WebSocket coordinator publishes onto it as well.
    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    /// Register `listener` for `topic` and make sure the topic's stream is
    /// open. Returns `false` if the listener was already registered.
    pub fn subscribe(&self, topic: StreamTopic, listener: Arc<dyn Listener>) -> bool {
        let added = self.bus.subscribe(topic, listener);
        self.ensure_connected(topic);
        added
    }

    /// Remove a listener; the stream stays open.
    pub fn unsubscribe(&self, topic: &StreamTopic, listener: &Arc<dyn Listener>) -> bool {
        self.bus.unsubscribe(topic, listener)
    }

    fn ensure_connected(&self, topic: StreamTopic) {
        // The entry lock is held while the task is spawned so the pump never
        // sees an event from a connection it does not know yet.
        match self.connections.entry(topic) {
            Entry::Occupied(entry) if entry.get().is_live() => {
                debug!(target: "realtime", topic = %topic, "Stream already open");
            }
            Entry::Occupied(mut entry) => {
                let stale = entry.insert(self.open(topic));
                stale.close();
            }
            Entry::Vacant(entry) => {
                entry.insert(self.open(topic));
            }
        }
        self.states.remove(&topic);
    }

    fn open(&self, topic: StreamTopic) -> ConnectionHandle {
        ConnectionHandle::open(
            topic,
            self.config.sse_url(&topic),
            self.connector.clone(),
            self.config.sse_reconnect,
            self.events.clone(),
        )
    }

    /// Close one stream with the normal closure code. Listeners stay registered.
    pub fn disconnect(&self, topic: &StreamTopic) {
        if let Some((_, handle)) = self.connections.remove(topic) {
            handle.close();
            info!(target: "realtime", topic = %topic, "Disconnected stream");
        }
        self.states.remove(topic);
    }

    /// Close every stream and drop every listener.
    pub fn disconnect_all(&self) {
        let topics: Vec<StreamTopic> = self.connections.iter().map(|e| *e.key()).collect();
        for topic in &topics {
            if let Some((_, handle)) = self.connections.remove(topic) {
                handle.close();
            }
        }
        self.states.clear();
        self.bus.clear();
        info!(target: "realtime", streams = topics.len(), "Disconnected all streams");
    }

    pub fn status(&self, topic: &StreamTopic) -> ConnectionState {
        if let Some(handle) = self.connections.get(topic) {
            return handle.state();
        }
        self.states.get(topic).map(|s| *s).unwrap_or_default()
    }

    pub fn is_connected(&self, topic: &StreamTopic) -> bool {
        self.status(topic).is_connected()
    }

    /// Topics with a live (or reconnecting) stream.
    pub fn connected_topics(&self) -> Vec<StreamTopic> {
        let mut topics: Vec<StreamTopic> = self
            .connections
            .iter()
            .filter(|e| e.value().is_live())
            .map(|e| *e.key())
            .collect();
        topics.sort();
        topics
    }
}

impl Drop for RealtimeDispatcher {
    fn drop(&mut self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.pump.abort();
    }
}

async fn pump(
    mut rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    bus: Arc<MessageBus>,
    connections: Arc<DashMap<StreamTopic, ConnectionHandle>>,
    states: Arc<DashMap<StreamTopic, ConnectionState>>,
    status_port: Arc<dyn ConnectionStatusPort>,
) {
    while let Some(event) = rx.recv().await {
        let current = connections.get(&event.topic).map(|h| h.id()) == Some(event.connection_id);
        if !current {
            // Superseded or disconnected
            continue;
        }

        match event.update {
            ConnectionUpdate::Frame(raw) => dispatch(&bus, &event.topic, event.kind, &raw),
            ConnectionUpdate::Failure { attempt, reason } => {
                warn!(
                    target: "realtime",
                    topic = %event.topic,
                    attempt,
                    reason = %reason,
                    "Stream error"
                );
            }
            ConnectionUpdate::State(ConnectionState::Failed) => {
                connections.remove_if(&event.topic, |_, h| h.id() == event.connection_id);
                states.insert(event.topic, ConnectionState::Failed);
                error!(target: "realtime", topic = %event.topic, "Max reconnection attempts reached");
                status_port.render_connection_status(
                    &event.topic,
                    TransportKind::Sse,
                    ConnectionState::Failed,
                );
            }
            ConnectionUpdate::State(state) => {
                debug!(target: "realtime", topic = %event.topic, state = ?state, "Stream state");
            }
        }
    }
}

/// Parse a frame and publish it to the topic its `type` routes to.
pub(crate) fn dispatch(bus: &MessageBus, origin: &StreamTopic, source: TransportKind, raw: &str) {
    let message = match RealtimeMessage::from_json(source, raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(target: "realtime", topic = %origin, error = %e, "Dropping malformed message");
            return;
        }
    };

    match &message.kind {
        MessageKind::Error => {
            warn!(
                target: "realtime",
                topic = %origin,
                server_message = message.str_field("message").unwrap_or_default(),
                "Server reported an error"
            );
            return;
        }
        MessageKind::Connection => {
            debug!(target: "realtime", topic = %origin, "Connection acknowledged");
            return;
        }
        _ => {}
    }

    match route(origin, &message.kind) {
        Some(topic) => {
            bus.publish(&topic, &message);
        }
        None => debug!(target: "realtime", topic = %origin, kind = %message.kind, "Ignoring unknown message type"),
    }
}
