// Stream connection primitive
//
// One task per connection: dial, read frames in order, and on an abnormal end
// back off and redial until the attempt budget is spent.

use super::{
    BoxSession, ConnectionState, Connector, ReconnectPolicy, TransportEvent, TransportKind,
    NORMAL_CLOSURE,
};
use crate::message::StreamTopic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Something the connection task reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    State(ConnectionState),
    Frame(String),
    /// An abnormal end. `attempt` is the number of reconnects already made
    /// since the last successful open, so `0` marks a first failure.
    Failure { attempt: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connection_id: u64,
    pub topic: StreamTopic,
    pub kind: TransportKind,
    pub update: ConnectionUpdate,
}

/// Owner-side handle of a running connection.
///
/// Dropping the handle does not stop the task; call [`ConnectionHandle::close`].
pub struct ConnectionHandle {
    id: u64,
    topic: StreamTopic,
    kind: TransportKind,
    url: String,
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Spawn the connection task. Must be called inside a Tokio runtime.
    pub fn open(
        topic: StreamTopic,
        url: String,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        sink: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let kind = connector.kind();
        let alive = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let task = ConnectionTask {
            id,
            topic,
            kind,
            url: url.clone(),
            connector,
            policy,
            alive: alive.clone(),
            wake: wake.clone(),
            state: state_tx,
            sink,
        };
        let task = tokio::spawn(task.run());

        info!(target: "connection", topic = %topic, transport = %kind, url = %url, "Opening stream");

        Self {
            id,
            topic,
            kind,
            url,
            alive,
            wake,
            state: state_rx,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> StreamTopic {
        self.topic
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Still dialling, open or waiting to redial.
    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Close with the normal-closure code. Takes effect immediately: a pending
    /// reconnect timer is woken and will not redial.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(target: "connection", topic = %self.topic, transport = %self.kind, "Closing stream");
            self.wake.notify_one();
        }
    }
}

enum Outcome {
    /// Closed by us
    Cancelled,
    /// Peer closed with 1000
    Normal,
    Abnormal(String),
}

struct ConnectionTask {
    id: u64,
    topic: StreamTopic,
    kind: TransportKind,
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: watch::Sender<ConnectionState>,
    sink: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ConnectionTask {
    async fn run(self) {
        let mut attempts = 0u32;

        loop {
            if !self.is_alive() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let dialled = tokio::select! {
                biased;
                _ = self.wake.notified() => None,
                result = self.connector.connect(&self.url) => Some(result),
            };

            let outcome = match dialled {
                None => Outcome::Cancelled,
                Some(Ok(session)) => {
                    attempts = 0;
                    self.set_state(ConnectionState::Open);
                    info!(target: "connection", topic = %self.topic, transport = %self.kind, "Stream connected");
                    self.read(session).await
                }
                Some(Err(e)) => Outcome::Abnormal(e.to_string()),
            };

            let reason = match outcome {
                Outcome::Cancelled | Outcome::Normal => break,
                Outcome::Abnormal(_) if !self.is_alive() => break,
                Outcome::Abnormal(reason) => reason,
            };

            self.emit(ConnectionUpdate::Failure {
                attempt: attempts,
                reason: reason.clone(),
            });

            let Some((attempt, delay)) = self.policy.next_attempt(attempts) else {
                warn!(
                    target: "connection",
                    topic = %self.topic,
                    transport = %self.kind,
                    attempts,
                    "Max reconnection attempts reached"
                );
                self.set_state(ConnectionState::Failed);
                return;
            };
            attempts = attempt;

            debug!(
                target: "connection",
                topic = %self.topic,
                transport = %self.kind,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Reconnecting"
            );
            self.set_state(ConnectionState::Reconnecting);

            tokio::select! {
                biased;
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            // The timer may fire after close(); check before redialling
        }

        self.set_state(ConnectionState::Idle);
    }

    async fn read(&self, mut session: BoxSession) -> Outcome {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.wake.notified() => {
                    session.close().await;
                    return Outcome::Cancelled;
                }
                event = session.next_event() => event,
            };

            match event {
                Some(TransportEvent::Message(raw)) => {
                    if !self.emit(ConnectionUpdate::Frame(raw)) {
                        session.close().await;
                        return Outcome::Cancelled;
                    }
                }
                Some(TransportEvent::Error(reason)) => return Outcome::Abnormal(reason),
                Some(TransportEvent::Closed(NORMAL_CLOSURE)) => {
                    info!(target: "connection", topic = %self.topic, transport = %self.kind, "Stream closed normally");
                    return Outcome::Normal;
                }
                Some(TransportEvent::Closed(code)) => {
                    return Outcome::Abnormal(format!("closed with code {code}"))
                }
                None => return Outcome::Abnormal("stream ended".to_string()),
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.sink.is_closed()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        self.emit(ConnectionUpdate::State(state));
    }

    fn emit(&self, update: ConnectionUpdate) -> bool {
        self.sink
            .send(ConnectionEvent {
                connection_id: self.id,
                topic: self.topic,
                kind: self.kind,
                update,
            })
            .is_ok()
    }
}
