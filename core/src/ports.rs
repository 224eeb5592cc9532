// UI ports
//
// The realtime and map layers never touch a concrete UI. Hosts implement these
// traits (a web view bridge, a terminal monitor, a test mock) and the core
// drives them.

use crate::dashboard::{ProjectStatusUpdate, RecentUpdate, StatusCard};
use crate::map::choropleth::{ChoroplethLayer, Legend, RegionStyle};
use crate::map::Viewport;
use crate::message::StreamTopic;
use crate::stats::ProjectSummary;
use crate::transport::{ConnectionState, TransportKind};

/// Connection indicator ("live updates unavailable").
pub trait ConnectionStatusPort: Send + Sync {
    fn render_connection_status(
        &self,
        topic: &StreamTopic,
        transport: TransportKind,
        state: ConnectionState,
    );
}

/// Map surface the choropleth renders into.
pub trait MapPort: Send + Sync {
    /// Replace the region layer wholesale.
    fn render_layer(&self, layer: &ChoroplethLayer);
    fn remove_layer(&self);

    fn render_legend(&self, legend: &Legend);
    fn remove_legend(&self);

    fn render_summary(&self, summary: &ProjectSummary);
    fn remove_summary(&self);

    fn set_viewport(&self, viewport: &Viewport);

    /// Restyle one region in place (hover).
    fn set_region_style(&self, region: &str, style: &RegionStyle);
    fn bring_to_front(&self, region: &str);
}

/// Dashboard widgets fed by the realtime listeners.
pub trait DashboardPort: Send + Sync {
    /// Unread badge; a count of zero hides it.
    fn render_unread_count(&self, count: u64);
    fn show_toast(&self, message: &str);
    fn render_status_card(&self, card: StatusCard, count: u64);
    fn render_total_projects(&self, total: u64);
    fn show_recent_update(&self, update: &RecentUpdate);
    fn render_project_status(&self, update: &ProjectStatusUpdate);
}
