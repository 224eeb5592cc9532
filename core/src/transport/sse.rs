// Server-Sent Events connector
//
// Uses `eventsource-stream` over a reqwest byte stream so multi-line `data`
// fields, comments and keep-alives are handled by the parser.

use super::{BoxSession, Connector, TransportEvent, TransportKind, TransportSession};
use crate::config::Credentials;
use crate::{Result, TagumError};
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

type EventResult = std::result::Result<Event, EventStreamError<reqwest::Error>>;

pub struct SseConnector {
    client: reqwest::Client,
    credentials: Credentials,
}

impl SseConnector {
    pub fn new(client: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl Connector for SseConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn connect(&self, url: &str) -> Result<BoxSession> {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        let response = self.credentials.apply(request).send().await?;

        if let Some(err) = TagumError::from_status(response.status().as_u16()) {
            return Err(err);
        }

        let events = response.bytes_stream().eventsource().boxed();
        Ok(Box::new(SseSession { events }))
    }
}

struct SseSession {
    events: BoxStream<'static, EventResult>,
}

#[async_trait]
impl TransportSession for SseSession {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.events.next().await? {
                // Keep-alive blocks carry no data
                Ok(event) if event.data.trim().is_empty() => continue,
                Ok(event) => return Some(TransportEvent::Message(event.data)),
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the body stream closes the HTTP connection
        self.events = futures_util::stream::empty().boxed();
    }
}
