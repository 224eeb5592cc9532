// Dashboard projections
//
// Listeners that turn realtime messages into widget updates. Each keeps a
// snapshot of what it last rendered; a message simply overwrites the fields it
// carries, so the same event arriving over both transports renders the same
// result twice.

use crate::bus::Listener;
use crate::message::{MessageKind, RealtimeMessage};
use crate::ports::DashboardPort;
use crate::stats::lenient_f64;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCard {
    Planned,
    InProgress,
    Completed,
    Delayed,
}

impl StatusCard {
    pub const ALL: [StatusCard; 4] = [
        StatusCard::Planned,
        StatusCard::InProgress,
        StatusCard::Completed,
        StatusCard::Delayed,
    ];

    /// Key in the `status_counts` object.
    pub fn key(&self) -> &'static str {
        match self {
            StatusCard::Planned => "planned",
            StatusCard::InProgress => "in_progress",
            StatusCard::Completed => "completed",
            StatusCard::Delayed => "delayed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStatusUpdate {
    pub project_id: u64,
    pub status: Option<String>,
    pub progress: Option<f64>,
}

impl ProjectStatusUpdate {
    /// Read from a payload that names the project as `project_id` or `id`.
    fn from_value(value: &Value) -> Option<Self> {
        let project_id = value
            .get("project_id")
            .or_else(|| value.get("id"))
            .and_then(Value::as_u64)?;

        let status = value
            .get("status")
            .or_else(|| value.get("new_status"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let progress = value
            .get("progress")
            .or_else(|| value.get("progress_data").and_then(|p| p.get("progress")))
            .and_then(lenient_f64);

        Some(Self {
            project_id,
            status,
            progress,
        })
    }
}

/// What the dashboard currently shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    pub unread_count: Option<u64>,
    pub total_projects: Option<u64>,
    pub status_counts: BTreeMap<StatusCard, u64>,
    pub projects: BTreeMap<u64, ProjectStatusUpdate>,
}

// A port that panicked mid-render leaves the snapshot consistent (fields are
// committed only after the port returns), so a poisoned lock is recovered.
fn lock(state: &Mutex<DashboardState>) -> MutexGuard<'_, DashboardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unread badge and toast for `notification` messages.
///
/// Accepts both the SSE shape (`unread_count` plus `notification.message`) and
/// the WebSocket shape (`message`).
pub struct NotificationListener {
    port: Arc<dyn DashboardPort>,
    state: Mutex<DashboardState>,
}

impl NotificationListener {
    pub fn new(port: Arc<dyn DashboardPort>) -> Self {
        Self {
            port,
            state: Mutex::new(DashboardState::default()),
        }
    }

    pub fn unread_count(&self) -> Option<u64> {
        lock(&self.state).unread_count
    }
}

impl Listener for NotificationListener {
    fn on_message(&self, message: &RealtimeMessage) -> Result<()> {
        if message.kind != MessageKind::Notification {
            return Ok(());
        }

        if let Some(count) = message.u64_field("unread_count") {
            self.port.render_unread_count(count);
            lock(&self.state).unread_count = Some(count);
        }

        let text = message
            .payload
            .get("notification")
            .and_then(|n| n.get("message"))
            .or_else(|| message.payload.get("message"))
            .and_then(Value::as_str);
        if let Some(text) = text {
            self.port.show_toast(text);
        }
        Ok(())
    }
}

/// Status cards, project total and recent updates for `dashboard_update`.
pub struct DashboardListener {
    port: Arc<dyn DashboardPort>,
    state: Mutex<DashboardState>,
}

impl DashboardListener {
    pub fn new(port: Arc<dyn DashboardPort>) -> Self {
        Self {
            port,
            state: Mutex::new(DashboardState::default()),
        }
    }

    pub fn snapshot(&self) -> DashboardState {
        lock(&self.state).clone()
    }

    fn apply_counts(&self, counts: &Value, total: Option<u64>) {
        // Diff under the lock, render without it
        let (total, cards) = {
            let state = lock(&self.state);
            let total = total.filter(|t| state.total_projects != Some(*t));
            let cards: Vec<(StatusCard, u64)> = StatusCard::ALL
                .into_iter()
                .filter_map(|card| {
                    let value = counts.get(card.key()).and_then(Value::as_u64)?;
                    (state.status_counts.get(&card) != Some(&value)).then_some((card, value))
                })
                .collect();
            (total, cards)
        };

        if let Some(total) = total {
            self.port.render_total_projects(total);
            lock(&self.state).total_projects = Some(total);
        }
        for (card, value) in cards {
            self.port.render_status_card(card, value);
            lock(&self.state).status_counts.insert(card, value);
        }
    }
}

impl Listener for DashboardListener {
    fn on_message(&self, message: &RealtimeMessage) -> Result<()> {
        if message.kind != MessageKind::DashboardUpdate {
            return Ok(());
        }

        if let Some(counts) = message.payload.get("status_counts") {
            self.apply_counts(counts, message.u64_field("total_projects"));
        }

        if let Some(updates) = message.payload.get("recent_updates").and_then(Value::as_array) {
            for update in updates {
                match RecentUpdate::deserialize(update) {
                    Ok(update) => self.port.show_recent_update(&update),
                    Err(e) => debug!(target: "dashboard", error = %e, "Skipping recent update"),
                }
            }
        }

        // Synthesised from a WebSocket project change
        if let Some(project) = message.payload.get("project_update") {
            let update = RecentUpdate {
                name: project
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status: project
                    .get("status")
                    .or_else(|| project.get("new_status"))
                    .and_then(Value::as_str)
                    .or_else(|| project.get("type").and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string(),
            };
            self.port.show_recent_update(&update);
        }
        Ok(())
    }
}

/// Status badge and progress bar of one project, or of every project.
pub struct ProjectStatusListener {
    port: Arc<dyn DashboardPort>,
    project_id: Option<u64>,
    state: Mutex<DashboardState>,
}

impl ProjectStatusListener {
    /// `project_id` selects a single-project page; `None` watches the list.
    pub fn new(port: Arc<dyn DashboardPort>, project_id: Option<u64>) -> Self {
        Self {
            port,
            project_id,
            state: Mutex::new(DashboardState::default()),
        }
    }

    pub fn project(&self, id: u64) -> Option<ProjectStatusUpdate> {
        lock(&self.state).projects.get(&id).cloned()
    }

    fn render(&self, update: ProjectStatusUpdate) {
        if self.project_id.is_some_and(|id| id != update.project_id) {
            return;
        }
        self.port.render_project_status(&update);
        lock(&self.state).projects.insert(update.project_id, update);
    }
}

impl Listener for ProjectStatusListener {
    fn on_message(&self, message: &RealtimeMessage) -> Result<()> {
        match &message.kind {
            MessageKind::ProjectStatus => match self.project_id {
                Some(_) => {
                    if let Some(update) = ProjectStatusUpdate::from_value(&message.payload) {
                        self.render(update);
                    }
                }
                None => {
                    let projects = message
                        .payload
                        .get("projects")
                        .and_then(Value::as_array)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    for project in projects {
                        if let Some(update) = ProjectStatusUpdate::from_value(project) {
                            self.render(update);
                        }
                    }
                }
            },
            kind if kind.is_project_update() => {
                if let Some(update) = ProjectStatusUpdate::from_value(&message.payload) {
                    self.render(update);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
