mod config;
mod ports;

use config::{MapConfig, MonitorConfig};
use ports::TracingPorts;
use std::sync::Arc;
use std::time::Duration;
use tagum_core::dashboard::{DashboardListener, NotificationListener, ProjectStatusListener};
use tagum_core::map::{ChoroplethRenderer, HttpBoundarySource, HttpMetadataSource};
use tagum_core::stats::ProjectRecord;
use tagum_core::telemetry::init_tracing;
use tagum_core::{RealtimeConfig, StreamTopic, Tagum};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional; real environment variables take precedence
    let _ = dotenvy::dotenv();
    init_tracing("info,tagum_core=info,dashboard_monitor=info")?;

    info!(target: "dashboard_monitor", "Starting Tagum dashboard monitor");

    // Defaults + env + optional TOML overlay
    let cfg = MonitorConfig::load();
    let ports = Arc::new(TracingPorts);

    let tagum = Tagum::new(cfg.realtime.clone(), ports.clone())?;

    tagum
        .dispatcher
        .subscribe(StreamTopic::Notifications, Arc::new(NotificationListener::new(ports.clone())));
    tagum
        .dispatcher
        .subscribe(StreamTopic::Dashboard, Arc::new(DashboardListener::new(ports.clone())));
    tagum.dispatcher.subscribe(
        StreamTopic::Projects(cfg.project_id),
        Arc::new(ProjectStatusListener::new(ports.clone(), cfg.project_id)),
    );

    tagum.start().await?;

    let mut renderer = if cfg.map.enabled {
        render_map(&cfg.realtime, &cfg.map, ports.clone()).await
    } else {
        None
    };

    signal::ctrl_c().await?;
    info!(target: "dashboard_monitor", "Shutting down...");

    if let Some(renderer) = renderer.as_mut() {
        renderer.cleanup();
    }
    tagum.shutdown().await?;
    Ok(())
}

/// Load boundaries and metadata, render the projects view, then cycle through
/// the configured thematic views once.
async fn render_map(
    realtime: &RealtimeConfig,
    map: &MapConfig,
    ports: Arc<TracingPorts>,
) -> Option<ChoroplethRenderer> {
    let client = match Tagum::http_client(realtime) {
        Ok(client) => client,
        Err(e) => {
            error!(target: "dashboard_monitor", error = %e, "Failed to build HTTP client");
            return None;
        }
    };
    let timeout = Duration::from_millis(realtime.request_timeout_ms);

    let boundaries = Arc::new(HttpBoundarySource::new(
        client.clone(),
        realtime.boundary_url.clone(),
        realtime.credentials.clone(),
        timeout,
    ));
    let metadata = Arc::new(HttpMetadataSource::new(
        client,
        realtime.metadata_url(),
        realtime.credentials.clone(),
        timeout,
    ));
    let mut renderer = ChoroplethRenderer::new(ports, boundaries, metadata);

    let records = map
        .projects_file
        .as_deref()
        .map(load_records)
        .unwrap_or_default();

    if let Err(e) = renderer.initialize(records).await {
        error!(target: "dashboard_monitor", error = %e, "Map unavailable");
        return None;
    }

    for view in &map.views {
        if let Err(e) = renderer.switch_view(*view).await {
            warn!(target: "dashboard_monitor", view = %view, error = %e, "View switch failed");
        }
    }
    Some(renderer)
}

fn load_records(path: &std::path::Path) -> Vec<ProjectRecord> {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<Vec<ProjectRecord>>(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(records) => {
            info!(target: "dashboard_monitor", path = %path.display(), records = records.len(), "Loaded project records");
            records
        }
        Err(e) => {
            warn!(target: "dashboard_monitor", path = %path.display(), error = %e, "Failed to load project records");
            Vec::new()
        }
    }
}
