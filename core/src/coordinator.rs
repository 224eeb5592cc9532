// Dual-Transport Coordinator
//
// Optional WebSocket streams running beside SSE. Messages are normalised and
// re-injected on the dispatcher's bus; SSE connections are never touched.
// Failures stay quiet: SSE remains the source of truth.

use crate::bus::MessageBus;
use crate::config::RealtimeConfig;
use crate::message::{route, MessageKind, RealtimeMessage, StreamTopic};
use crate::transport::{
    ConnectionEvent, ConnectionHandle, ConnectionState, ConnectionUpdate, Connector,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of the WebSocket side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportStatus {
    pub notifications: ConnectionState,
    pub projects: ConnectionState,
    pub enabled: bool,
}

pub struct DualTransportCoordinator {
    config: RealtimeConfig,
    connector: Arc<dyn Connector>,
    bus: Arc<MessageBus>,
    connections: Arc<DashMap<StreamTopic, ConnectionHandle>>,
    states: Arc<DashMap<StreamTopic, ConnectionState>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    pump: JoinHandle<()>,
}

impl DualTransportCoordinator {
    /// Must be called inside a Tokio runtime.
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>, bus: Arc<MessageBus>) -> Self {
        let connections = Arc::new(DashMap::new());
        let states = Arc::new(DashMap::new());
        let (events, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(pump(rx, bus.clone(), connections.clone(), states.clone()));

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

    pub fn is_enabled(&self) -> bool {
        self.config.enable_websocket
    }

    /// Open both sockets when the feature flag is on; otherwise do nothing.
    pub fn start(&self) {
        if !self.is_enabled() {
            debug!(target: "coordinator", "WebSocket transport disabled, using SSE only");
            return;
        }
        self.connect_notifications();
        self.connect_projects();
    }

    pub fn connect_notifications(&self) {
        self.connect(StreamTopic::Notifications);
    }

    pub fn connect_projects(&self) {
        self.connect(StreamTopic::Projects(None));
    }

    fn connect(&self, topic: StreamTopic) {
        if !self.is_enabled() {
            return;
        }
        let Some(url) = self.config.ws_url(&topic) else {
            return;
        };

        match self.connections.entry(topic) {
            Entry::Occupied(entry) if entry.get().is_live() => {}
            Entry::Occupied(mut entry) => {
                let stale = entry.insert(self.open(topic, url));
                stale.close();
            }
            Entry::Vacant(entry) => {
                entry.insert(self.open(topic, url));
            }
        }
        self.states.remove(&topic);
    }

    fn open(&self, topic: StreamTopic, url: String) -> ConnectionHandle {
        ConnectionHandle::open(
            topic,
            url,
            self.connector.clone(),
            self.config.ws_reconnect,
            self.events.clone(),
        )
    }

    /// Close every socket with the normal closure code.
    pub fn disconnect_all(&self) {
        let topics: Vec<StreamTopic> = self.connections.iter().map(|e| *e.key()).collect();
        for topic in &topics {
            if let Some((_, handle)) = self.connections.remove(topic) {
                handle.close();
            }
        }
        self.states.clear();
        if !topics.is_empty() {
            info!(target: "coordinator", "All WebSocket connections closed");
        }
    }

    pub fn status(&self) -> TransportStatus {
        TransportStatus {
            notifications: self.state_of(&StreamTopic::Notifications),
            projects: self.state_of(&StreamTopic::Projects(None)),
            enabled: self.is_enabled(),
        }
    }

    fn state_of(&self, topic: &StreamTopic) -> ConnectionState {
        if let Some(handle) = self.connections.get(topic) {
            return handle.state();
        }
        self.states.get(topic).map(|s| *s).unwrap_or_default()
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }
}

impl Drop for DualTransportCoordinator {
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
) {
    let mut reported: HashSet<StreamTopic> = HashSet::new();

    while let Some(event) = rx.recv().await {
        let current = connections.get(&event.topic).map(|h| h.id()) == Some(event.connection_id);
        if !current {
            continue;
        }

        match event.update {
            ConnectionUpdate::Frame(raw) => {
                let message = match RealtimeMessage::from_json(event.kind, &raw) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(target: "coordinator", topic = %event.topic, error = %e, "Error parsing WebSocket data");
                        continue;
                    }
                };
                for (topic, message) in normalize_websocket(&event.topic, message) {
                    bus.publish(&topic, &message);
                }
            }
            ConnectionUpdate::Failure { .. } => {
                if reported.insert(event.topic) {
                    info!(target: "coordinator", topic = %event.topic, "WebSocket not available, using SSE only");
                }
            }
            ConnectionUpdate::State(ConnectionState::Open) => {
                reported.remove(&event.topic);
                info!(target: "coordinator", topic = %event.topic, "WebSocket connected");
            }
            ConnectionUpdate::State(ConnectionState::Failed) => {
                connections.remove_if(&event.topic, |_, h| h.id() == event.connection_id);
                states.insert(event.topic, ConnectionState::Failed);
                debug!(target: "coordinator", topic = %event.topic, "WebSocket connection failed, using SSE fallback");
            }
            ConnectionUpdate::State(_) => {}
        }
    }
}

/// Map a WebSocket message onto the topics it is delivered to.
///
/// Project change types fan out to the projects topic, to the single-project
/// topic when the payload names one, and to the dashboard as a synthesised
/// `dashboard_update` wrapper. Other known kinds route as they would over
/// SSE; unknown kinds and server errors go nowhere.
pub fn normalize_websocket(
    origin: &StreamTopic,
    message: RealtimeMessage,
) -> Vec<(StreamTopic, RealtimeMessage)> {
    if message.kind.is_project_update() {
        let wrapper = RealtimeMessage::new(
            MessageKind::DashboardUpdate,
            message.source,
            json!({
                "type": "dashboard_update",
                "project_update": message.payload.clone(),
                "source": "websocket",
            }),
        );

        let mut out = Vec::with_capacity(3);
        if let Some(id) = message.project_id() {
            out.push((StreamTopic::Projects(Some(id)), message.clone()));
        }
        out.push((StreamTopic::Projects(None), message));
        out.push((StreamTopic::Dashboard, wrapper));
        return out;
    }

    match message.kind {
        MessageKind::Error => {
            debug!(target: "coordinator", topic = %origin, "WebSocket error payload ignored");
            Vec::new()
        }
        MessageKind::Connection => Vec::new(),
        _ => match route(origin, &message.kind) {
            Some(topic) => vec![(topic, message)],
            None => Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    fn ws(raw: serde_json::Value) -> RealtimeMessage {
        RealtimeMessage::from_json(TransportKind::WebSocket, &raw.to_string()).unwrap()
    }

    #[test]
    fn project_update_fans_out() {
        let msg = ws(json!({"type": "cost_updated", "project_id": 9, "name": "Road"}));
        let routed = normalize_websocket(&StreamTopic::Projects(None), msg);
        let topics: Vec<StreamTopic> = routed.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            topics,
            vec![
                StreamTopic::Projects(Some(9)),
                StreamTopic::Projects(None),
                StreamTopic::Dashboard
            ]
        );

        let (_, wrapper) = &routed[2];
        assert_eq!(wrapper.kind, MessageKind::DashboardUpdate);
        assert_eq!(wrapper.payload["source"], "websocket");
        assert_eq!(wrapper.payload["project_update"]["name"], "Road");
    }

    #[test]
    fn notification_and_unknown() {
        let routed = normalize_websocket(
            &StreamTopic::Notifications,
            ws(json!({"type": "notification", "message": "hi"})),
        );
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, StreamTopic::Notifications);

        assert!(normalize_websocket(
            &StreamTopic::Projects(None),
            ws(json!({"type": "heartbeat"}))
        )
        .is_empty());
    }
}
