// Log-backed UI ports
//
// Every render call becomes a structured log line, so the monitor shows what a
// browser dashboard would display.

use tagum_core::dashboard::{ProjectStatusUpdate, RecentUpdate, StatusCard};
use tagum_core::map::choropleth::{ChoroplethLayer, Legend, RegionStyle};
use tagum_core::map::Viewport;
use tagum_core::stats::ProjectSummary;
use tagum_core::transport::{ConnectionState, TransportKind};
use tagum_core::{ConnectionStatusPort, DashboardPort, MapPort, StreamTopic};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct TracingPorts;

impl ConnectionStatusPort for TracingPorts {
    fn render_connection_status(
        &self,
        topic: &StreamTopic,
        transport: TransportKind,
        state: ConnectionState,
    ) {
        match state {
            ConnectionState::Failed => warn!(
                target: "dashboard_monitor",
                topic = %topic.key(),
                transport = ?transport,
                "Live updates unavailable"
            ),
            state => info!(
                target: "dashboard_monitor",
                topic = %topic.key(),
                transport = ?transport,
                state = ?state,
                "Connection status"
            ),
        }
    }
}

impl DashboardPort for TracingPorts {
    fn render_unread_count(&self, count: u64) {
        info!(target: "dashboard_monitor", unread = count, "🔔 Unread notifications");
    }

    fn show_toast(&self, message: &str) {
        info!(target: "dashboard_monitor", %message, "Notification");
    }

    fn render_status_card(&self, card: StatusCard, count: u64) {
        info!(target: "dashboard_monitor", card = card.key(), count, "Status card");
    }

    fn render_total_projects(&self, total: u64) {
        info!(target: "dashboard_monitor", total, "Total projects");
    }

    fn show_recent_update(&self, update: &RecentUpdate) {
        info!(target: "dashboard_monitor", name = %update.name, status = %update.status, "Recent update");
    }

    fn render_project_status(&self, update: &ProjectStatusUpdate) {
        info!(
            target: "dashboard_monitor",
            project_id = update.project_id,
            status = update.status.as_deref().unwrap_or("-"),
            progress = ?update.progress,
            "Project status"
        );
    }
}

impl MapPort for TracingPorts {
    fn render_layer(&self, layer: &ChoroplethLayer) {
        info!(target: "dashboard_monitor", view = %layer.mode, regions = layer.regions.len(), "🗺️  Choropleth layer");
        for region in &layer.regions {
            debug!(target: "dashboard_monitor", region = %region.name, fill = %region.style.fill_color, "{}", region.popup);
        }
    }

    fn remove_layer(&self) {
        debug!(target: "dashboard_monitor", "Layer removed");
    }

    fn render_legend(&self, legend: &Legend) {
        for entry in &legend.entries {
            info!(
                target: "dashboard_monitor",
                legend = %legend.title,
                label = %entry.label,
                color = %entry.color,
                count = ?entry.count,
                "Legend entry"
            );
        }
        if legend.unclassified > 0 {
            info!(target: "dashboard_monitor", unclassified = legend.unclassified, "Regions without classification");
        }
    }

    fn remove_legend(&self) {
        debug!(target: "dashboard_monitor", "Legend removed");
    }

    fn render_summary(&self, summary: &ProjectSummary) {
        info!(
            target: "dashboard_monitor",
            total = summary.total,
            completed = summary.completed,
            ongoing = summary.ongoing,
            planned = summary.planned,
            delayed = summary.delayed,
            "Project summary"
        );
    }

    fn remove_summary(&self) {
        debug!(target: "dashboard_monitor", "Summary removed");
    }

    fn set_viewport(&self, viewport: &Viewport) {
        info!(target: "dashboard_monitor", viewport = ?viewport, "Viewport");
    }

    fn set_region_style(&self, region: &str, style: &RegionStyle) {
        debug!(target: "dashboard_monitor", %region, weight = style.weight, "Region restyled");
    }

    fn bring_to_front(&self, region: &str) {
        debug!(target: "dashboard_monitor", %region, "Region raised");
    }
}
