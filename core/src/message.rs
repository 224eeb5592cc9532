// Normalized realtime message contract
//
// Both transports parse their frames into `RealtimeMessage` before anything is
// published, so listeners are written once against this shape.

use crate::transport::TransportKind;
use crate::{Result, TagumError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Push channel a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTopic {
    Notifications,
    Dashboard,
    /// All projects, or a single project stream when an id is given
    Projects(Option<u64>),
}

impl StreamTopic {
    /// Stable key used in logs and status output (`projects_12`).
    pub fn key(&self) -> String {
        match self {
            StreamTopic::Notifications => "notifications".to_string(),
            StreamTopic::Dashboard => "dashboard".to_string(),
            StreamTopic::Projects(None) => "projects".to_string(),
            StreamTopic::Projects(Some(id)) => format!("projects_{id}"),
        }
    }

    /// SSE path relative to the API base URL.
    pub fn sse_path(&self) -> String {
        match self {
            StreamTopic::Notifications => "/realtime/notifications/".to_string(),
            StreamTopic::Dashboard => "/realtime/dashboard/".to_string(),
            StreamTopic::Projects(None) => "/realtime/projects/".to_string(),
            StreamTopic::Projects(Some(id)) => format!("/realtime/projects/{id}/"),
        }
    }

    /// WebSocket path; the dashboard has no socket of its own.
    pub fn ws_path(&self) -> Option<&'static str> {
        match self {
            StreamTopic::Notifications => Some("/ws/notifications/"),
            StreamTopic::Projects(_) => Some("/ws/projects/"),
            StreamTopic::Dashboard => None,
        }
    }

    /// Topic with any sub-topic id removed.
    pub fn family(&self) -> StreamTopic {
        match self {
            StreamTopic::Projects(_) => StreamTopic::Projects(None),
            other => *other,
        }
    }
}

impl fmt::Display for StreamTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// The `type` discriminator carried by every payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Notification,
    DashboardUpdate,
    ProjectStatus,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    ProjectStatusChanged,
    CostUpdated,
    ProgressUpdated,
    /// Transport bookkeeping (`{"type": "connection", ...}`)
    Connection,
    /// Server-side error report
    Error,
    Unknown(String),
}

impl MessageKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "notification" => MessageKind::Notification,
            "dashboard_update" => MessageKind::DashboardUpdate,
            "project_status" => MessageKind::ProjectStatus,
            "project_created" => MessageKind::ProjectCreated,
            "project_updated" => MessageKind::ProjectUpdated,
            "project_deleted" => MessageKind::ProjectDeleted,
            "project_status_changed" => MessageKind::ProjectStatusChanged,
            "cost_updated" => MessageKind::CostUpdated,
            "progress_updated" => MessageKind::ProgressUpdated,
            "connection" => MessageKind::Connection,
            "error" => MessageKind::Error,
            other => MessageKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Notification => "notification",
            MessageKind::DashboardUpdate => "dashboard_update",
            MessageKind::ProjectStatus => "project_status",
            MessageKind::ProjectCreated => "project_created",
            MessageKind::ProjectUpdated => "project_updated",
            MessageKind::ProjectDeleted => "project_deleted",
            MessageKind::ProjectStatusChanged => "project_status_changed",
            MessageKind::CostUpdated => "cost_updated",
            MessageKind::ProgressUpdated => "progress_updated",
            MessageKind::Connection => "connection",
            MessageKind::Error => "error",
            MessageKind::Unknown(other) => other,
        }
    }

    /// Project change types pushed by the WebSocket backend.
    pub fn is_project_update(&self) -> bool {
        matches!(
            self,
            MessageKind::ProjectCreated
                | MessageKind::ProjectUpdated
                | MessageKind::ProjectDeleted
                | MessageKind::ProjectStatusChanged
                | MessageKind::CostUpdated
                | MessageKind::ProgressUpdated
        )
    }

    /// Topic family whose listeners receive this kind, if any.
    pub fn topic(&self) -> Option<StreamTopic> {
        match self {
            MessageKind::Notification => Some(StreamTopic::Notifications),
            MessageKind::DashboardUpdate => Some(StreamTopic::Dashboard),
            MessageKind::ProjectStatus => Some(StreamTopic::Projects(None)),
            kind if kind.is_project_update() => Some(StreamTopic::Projects(None)),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub kind: MessageKind,
    pub source: TransportKind,
    /// Full JSON object as received, `type` included
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl RealtimeMessage {
    pub fn new(kind: MessageKind, source: TransportKind, payload: Value) -> Self {
        Self {
            kind,
            source,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Parse a raw frame. The payload must be a JSON object; a missing `type`
    /// yields `MessageKind::Unknown("")`.
    pub fn from_json(source: TransportKind, raw: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(raw)?;
        if !payload.is_object() {
            return Err(TagumError::MalformedMessage(
                "payload is not a JSON object".to_string(),
            ));
        }
        let kind = MessageKind::parse(payload.get("type").and_then(Value::as_str).unwrap_or(""));
        Ok(Self::new(kind, source, payload))
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    pub fn u64_field(&self, field: &str) -> Option<u64> {
        self.payload.get(field).and_then(Value::as_u64)
    }

    pub fn project_id(&self) -> Option<u64> {
        self.u64_field("project_id")
    }

    /// Deserialize the payload into a typed view.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Resolve which topic a message received on `origin` is delivered to.
///
/// The stream's own topic wins when it belongs to the message's family, so
/// single-project listeners keep receiving their stream; otherwise the
/// family's default topic is used. Kinds without a family route nowhere.
pub fn route(origin: &StreamTopic, kind: &MessageKind) -> Option<StreamTopic> {
    let family = kind.topic()?;
    if origin.family() == family {
        Some(*origin)
    } else {
        Some(family)
    }
}
