use std::fs;
use std::path::{Path, PathBuf};

use tagum_core::map::ViewMode;
use tagum_core::RealtimeConfig;

/// High-level configuration for the dashboard monitor
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub realtime: RealtimeConfig,
    /// Watch a single project page instead of the project list
    pub project_id: Option<u64>,
    pub map: MapConfig,
}

/// Choropleth model rendered to the log at startup
#[derive(Clone, Debug, Default)]
pub struct MapConfig {
    pub enabled: bool,
    /// JSON array of project records; the map starts empty without it
    pub projects_file: Option<PathBuf>,
    pub views: Vec<ViewMode>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            realtime: RealtimeConfig::from_env(),
            project_id: std::env::var("MONITOR_PROJECT_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
            map: MapConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file (path via DASHBOARD_MONITOR_CONFIG or
    /// ./dashboard_monitor.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("DASHBOARD_MONITOR_CONFIG")
            .unwrap_or_else(|_| "dashboard_monitor.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "dashboard_monitor", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => Self::from_toml_str(&s, default),
            Err(e) => {
                tracing::warn!(target: "dashboard_monitor", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    fn from_toml_str(s: &str, default: Self) -> Self {
        match toml::from_str::<MonitorToml>(s) {
            Ok(t) => t.overlay(default),
            Err(e) => {
                tracing::warn!(target: "dashboard_monitor", error = %e, "Failed to parse TOML; using defaults");
                default
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MonitorToml {
    pub project_id: Option<u64>,
    pub realtime: Option<RealtimeToml>,
    pub map: Option<MapToml>,
}

impl MonitorToml {
    fn overlay(self, mut base: MonitorConfig) -> MonitorConfig {
        if let Some(x) = self.project_id {
            base.project_id = Some(x);
        }
        if let Some(r) = self.realtime {
            r.apply(&mut base.realtime);
        }
        if let Some(m) = self.map {
            m.apply(&mut base.map);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RealtimeToml {
    pub base_url: Option<String>,
    pub ws_base_url: Option<String>,
    pub enable_websocket: Option<bool>,
    pub boundary_url: Option<String>,
    pub session_cookie: Option<String>,
    pub api_token: Option<String>,
    pub max_attempts: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl RealtimeToml {
    fn apply(self, r: &mut RealtimeConfig) {
        if let Some(x) = self.base_url {
            r.base_url = x.trim_end_matches('/').to_string();
            r.ws_base_url = tagum_core::config::derive_ws_base(&r.base_url);
        }
        if let Some(x) = self.ws_base_url {
            r.ws_base_url = x.trim_end_matches('/').to_string();
        }
        if let Some(x) = self.enable_websocket {
            r.enable_websocket = x;
        }
        if let Some(x) = self.boundary_url {
            r.boundary_url = x;
        }
        if let Some(x) = self.session_cookie {
            r.credentials.session_cookie = Some(x);
        }
        if let Some(x) = self.api_token {
            r.credentials.api_token = Some(x);
        }
        if let Some(x) = self.max_attempts {
            r.sse_reconnect.max_attempts = x;
            r.ws_reconnect.max_attempts = x;
        }
        if let Some(x) = self.connect_timeout_ms {
            r.connect_timeout_ms = x;
        }
        if let Some(x) = self.request_timeout_ms {
            r.request_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MapToml {
    pub enabled: Option<bool>,
    pub projects_file: Option<PathBuf>,
    pub views: Option<Vec<String>>,
}

impl MapToml {
    fn apply(self, m: &mut MapConfig) {
        if let Some(x) = self.enabled {
            m.enabled = x;
        }
        if let Some(x) = self.projects_file {
            m.projects_file = Some(x);
        }
        if let Some(x) = self.views {
            m.views = x
                .iter()
                .filter_map(|v| match v.parse::<ViewMode>() {
                    Ok(mode) => Some(mode),
                    Err(e) => {
                        tracing::warn!(target: "dashboard_monitor", view = %v, error = %e, "Ignoring unknown view");
                        None
                    }
                })
                .collect();
        }
    }
}
