// Stream transports
//
// A `Connector` dials one push channel and hands back a `TransportSession`;
// `connection` owns the reconnect loop on top of it.

pub mod backoff;
pub mod connection;
pub mod sse;
pub mod websocket;

pub use backoff::{BackoffPolicy, ReconnectPolicy};
pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionUpdate};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket normal-closure code; never triggers reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the peer closed without sending one.
pub const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "websocket")]
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => f.write_str("sse"),
            TransportKind::WebSocket => f.write_str("websocket"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    /// Reconnect attempts exhausted; terminal until the topic is dialled again
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// What a session yields while it is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One complete text frame / SSE `data` block
    Message(String),
    /// Transport-level error; the session is considered dead afterwards
    Error(String),
    /// Peer closed with the given code
    Closed(u16),
}

/// An open push channel.
#[async_trait]
pub trait TransportSession: Send {
    /// Next event, or `None` when the underlying stream ended.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close with the normal-closure code.
    async fn close(&mut self);
}

pub type BoxSession = Box<dyn TransportSession>;

/// Dials a push endpoint. A successful `connect` is the open signal.
#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn connect(&self, url: &str) -> Result<BoxSession>;
}
