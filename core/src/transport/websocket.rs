// WebSocket connector over tokio-tungstenite

use super::{
    BoxSession, Connector, TransportEvent, TransportKind, TransportSession, NO_STATUS_RECEIVED,
};
use crate::config::Credentials;
use crate::{Result, TagumError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsConnector {
    credentials: Credentials,
}

impl WsConnector {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn connect(&self, url: &str) -> Result<BoxSession> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TagumError::Connection(format!("Invalid WebSocket URL {url}: {e}")))?;

        for (name, value) in self.credentials.headers() {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TagumError::Config(format!("Invalid {name} header: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TagumError::Transport(format!("WebSocket connect failed: {e}")))?;

        Ok(Box::new(WsSession { ws }))
    }
}

struct WsSession {
    ws: WsStream,
}

#[async_trait]
impl TransportSession for WsSession {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let message = match self.ws.next().await? {
                Ok(message) => message,
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            };

            match message {
                Message::Text(text) => return Some(TransportEvent::Message(text.to_string())),
                Message::Binary(bytes) => {
                    return Some(match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(e) => TransportEvent::Error(format!("non UTF-8 binary frame: {e}")),
                    })
                }
                Message::Close(frame) => {
                    let code = frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_RECEIVED);
                    return Some(TransportEvent::Closed(code));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed("Client disconnecting"),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            tracing::debug!(target: "connection", error = %e, "WebSocket close handshake failed");
        }
    }
}
