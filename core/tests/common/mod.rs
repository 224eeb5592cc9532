// Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tagum_core::dashboard::{ProjectStatusUpdate, RecentUpdate, StatusCard};
use tagum_core::map::choropleth::{ChoroplethLayer, Legend, RegionStyle};
use tagum_core::map::Viewport;
use tagum_core::stats::ProjectSummary;
use tagum_core::transport::{BoxSession, TransportEvent, TransportSession};
use tagum_core::{
    ConnectionState, ConnectionStatusPort, Connector, DashboardPort, Listener, MapPort,
    RealtimeMessage, Result, StreamTopic, TagumError, TransportKind,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

// ============================================================================
// Scripted connector
// ============================================================================

enum Script {
    Fail(String),
    Open(mpsc::UnboundedReceiver<TransportEvent>),
}

/// Connector whose dials follow a per-URL script. A URL with nothing queued
/// fails to connect.
pub struct ScriptedConnector {
    kind: TransportKind,
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    dials: Mutex<Vec<(String, Instant)>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            dials: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue a successful dial; the returned sender feeds the session.
    pub fn push_open(&self, url: &str) -> mpsc::UnboundedSender<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(url, Script::Open(rx));
        tx
    }

    pub fn push_failure(&self, url: &str, reason: &str) {
        self.push(url, Script::Fail(reason.to_string()));
    }

    fn push(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }

    pub fn dials_to(&self, url: &str) -> Vec<Instant> {
        self.dials
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Milliseconds between consecutive dials to `url`.
    pub fn gaps_ms(&self, url: &str) -> Vec<u64> {
        self.dials_to(url)
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn connect(&self, url: &str) -> Result<BoxSession> {
        self.dials
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());

        match script {
            Some(Script::Open(events)) => Ok(Box::new(ChannelSession {
                events,
                closes: self.closes.clone(),
            })),
            Some(Script::Fail(reason)) => Err(TagumError::Transport(reason)),
            None => Err(TagumError::Transport("connection refused".to_string())),
        }
    }
}

struct ChannelSession {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportSession for ChannelSession {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.close();
    }
}

// ============================================================================
// Recording listener and ports
// ============================================================================

#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<RealtimeMessage>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<RealtimeMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl Listener for Recorder {
    fn on_message(&self, message: &RealtimeMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStatusPort {
    pub events: Mutex<Vec<(StreamTopic, TransportKind, ConnectionState)>>,
}

impl RecordingStatusPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(StreamTopic, TransportKind, ConnectionState)> {
        self.events.lock().unwrap().clone()
    }
}

impl ConnectionStatusPort for RecordingStatusPort {
    fn render_connection_status(
        &self,
        topic: &StreamTopic,
        transport: TransportKind,
        state: ConnectionState,
    ) {
        self.events.lock().unwrap().push((*topic, transport, state));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    RenderLayer(ChoroplethLayer),
    RemoveLayer,
    RenderLegend(Legend),
    RemoveLegend,
    RenderSummary(ProjectSummary),
    RemoveSummary,
    Viewport(Viewport),
    Style(String, RegionStyle),
    BringToFront(String),
}

#[derive(Default)]
pub struct RecordingMap {
    calls: Mutex<Vec<MapCall>>,
}

impl RecordingMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<MapCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn layers_rendered(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MapCall::RenderLayer(_)))
            .count()
    }

    fn record(&self, call: MapCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MapPort for RecordingMap {
    fn render_layer(&self, layer: &ChoroplethLayer) {
        self.record(MapCall::RenderLayer(layer.clone()));
    }
    fn remove_layer(&self) {
        self.record(MapCall::RemoveLayer);
    }
    fn render_legend(&self, legend: &Legend) {
        self.record(MapCall::RenderLegend(legend.clone()));
    }
    fn remove_legend(&self) {
        self.record(MapCall::RemoveLegend);
    }
    fn render_summary(&self, summary: &ProjectSummary) {
        self.record(MapCall::RenderSummary(*summary));
    }
    fn remove_summary(&self) {
        self.record(MapCall::RemoveSummary);
    }
    fn set_viewport(&self, viewport: &Viewport) {
        self.record(MapCall::Viewport(*viewport));
    }
    fn set_region_style(&self, region: &str, style: &RegionStyle) {
        self.record(MapCall::Style(region.to_string(), style.clone()));
    }
    fn bring_to_front(&self, region: &str) {
        self.record(MapCall::BringToFront(region.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashCall {
    Unread(u64),
    Toast(String),
    Card(StatusCard, u64),
    Total(u64),
    Recent(RecentUpdate),
    Project(ProjectStatusUpdate),
}

#[derive(Default)]
pub struct RecordingDashboard {
    calls: Mutex<Vec<DashCall>>,
}

impl RecordingDashboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DashCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<DashCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: DashCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DashboardPort for RecordingDashboard {
    fn render_unread_count(&self, count: u64) {
        self.record(DashCall::Unread(count));
    }
    fn show_toast(&self, message: &str) {
        self.record(DashCall::Toast(message.to_string()));
    }
    fn render_status_card(&self, card: StatusCard, count: u64) {
        self.record(DashCall::Card(card, count));
    }
    fn render_total_projects(&self, total: u64) {
        self.record(DashCall::Total(total));
    }
    fn show_recent_update(&self, update: &RecentUpdate) {
        self.record(DashCall::Recent(update.clone()));
    }
    fn render_project_status(&self, update: &ProjectStatusUpdate) {
        self.record(DashCall::Project(update.clone()));
    }
}

// ============================================================================
// Log capture
// ============================================================================

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub target: String,
    /// Field name -> rendered value; the format string is under `message`
    pub fields: BTreeMap<String, String>,
}

/// Layer recording every event, installed as the thread's default subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn events(&self, target: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }

    /// Events of `target` about `topic` whose message contains `needle`.
    pub fn count(&self, target: &str, topic: &StreamTopic, needle: &str) -> usize {
        let topic = topic.to_string();
        self.events(target)
            .iter()
            .filter(|e| e.fields.get("topic") == Some(&topic))
            .filter(|e| e.fields.get("message").is_some_and(|m| m.contains(needle)))
            .count()
    }
}

struct FieldVisitor<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        self.events.lock().unwrap().push(CapturedEvent {
            target: event.metadata().target().to_string(),
            fields,
        });
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` until it holds; panics after ~5s (virtual or real).
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn message(raw: &str) -> TransportEvent {
    TransportEvent::Message(raw.to_string())
}
