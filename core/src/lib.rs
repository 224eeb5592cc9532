// Tagum Core Library
// Realtime transports, barangay statistics and choropleth model for the
// project monitoring dashboard

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod map;
pub mod message;
pub mod ports;
pub mod realtime;
pub mod stats;
pub mod telemetry;
pub mod transport;

// Export core types
pub use bus::{BusStats, Listener, MessageBus};
pub use config::{Credentials, RealtimeConfig};
pub use coordinator::{DualTransportCoordinator, TransportStatus};
pub use message::{MessageKind, RealtimeMessage, StreamTopic};
pub use ports::{ConnectionStatusPort, DashboardPort, MapPort};
pub use realtime::RealtimeDispatcher;
pub use transport::{ConnectionState, Connector, TransportKind};

use std::sync::Arc;
use std::time::Duration;
use transport::sse::SseConnector;
use transport::websocket::WsConnector;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagumError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication required (401)")]
    Unauthorized,

    #[error("Access forbidden (403)")]
    Forbidden,

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Invalid boundary data: {0}")]
    InvalidBoundary(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
}

impl TagumError {
    /// Map a non-success HTTP status to an error; 401 and 403 stay distinguishable.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(TagumError::Unauthorized),
            403 => Some(TagumError::Forbidden),
            status => Some(TagumError::Http { status }),
        }
    }
}

pub type Result<T> = std::result::Result<T, TagumError>;

/// Core runtime
///
/// Owns the SSE dispatcher and the optional WebSocket coordinator. Both publish
/// onto the same [`MessageBus`], so UI listeners never see which transport
/// delivered a message. Must be created inside a Tokio runtime.
pub struct Tagum {
    config: RealtimeConfig,
    pub dispatcher: Arc<RealtimeDispatcher>,
    pub coordinator: Arc<DualTransportCoordinator>,
}

impl Tagum {
    pub fn new(config: RealtimeConfig, status_port: Arc<dyn ConnectionStatusPort>) -> Result<Self> {
        let client = Self::http_client(&config)?;
        let sse: Arc<dyn Connector> =
            Arc::new(SseConnector::new(client, config.credentials.clone()));
        let ws: Arc<dyn Connector> = Arc::new(WsConnector::new(config.credentials.clone()));
        Ok(Self::with_connectors(config, status_port, sse, ws))
    }

    /// Build the runtime over explicit connectors (used by tests and embedders).
    pub fn with_connectors(
        config: RealtimeConfig,
        status_port: Arc<dyn ConnectionStatusPort>,
        sse: Arc<dyn Connector>,
        ws: Arc<dyn Connector>,
    ) -> Self {
        let dispatcher = Arc::new(RealtimeDispatcher::new(config.clone(), sse, status_port));
        let coordinator = Arc::new(DualTransportCoordinator::new(
            config.clone(),
            ws,
            dispatcher.bus(),
        ));
        Self {
            config,
            dispatcher,
            coordinator,
        }
    }

    /// Shared HTTP client. Only the connect phase is bounded: SSE bodies are
    /// long-lived, so one-shot fetches set their own per-request timeout.
    pub fn http_client(config: &RealtimeConfig) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;
        Ok(client)
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.dispatcher.bus()
    }

    pub async fn start(&self) -> Result<()> {
        tracing::info!(
            target: "tagum",
            base_url = %self.config.base_url,
            websocket = self.config.enable_websocket,
            "Starting Tagum realtime..."
        );

        self.coordinator.start();

        tracing::info!(target: "tagum", "Tagum realtime started");
        Ok(())
    }

    /// Page-unload equivalent: closes every stream with the normal closure code.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(target: "tagum", "Shutting down Tagum realtime...");

        self.coordinator.disconnect_all();
        self.dispatcher.disconnect_all();

        tracing::info!(target: "tagum", "Tagum realtime shut down");
        Ok(())
    }
}
