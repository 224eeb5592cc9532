// Process-wide configuration
//
// Read once at startup; the WebSocket flag is the only feature switch.

use crate::message::StreamTopic;
use crate::transport::ReconnectPolicy;
use std::time::Duration;

/// Existing session credentials forwarded on every request.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// Raw `Cookie` header value, e.g. `sessionid=...; csrftoken=...`
    pub session_cookie: Option<String>,
    pub api_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            session_cookie: std::env::var("TAGUM_SESSION_COOKIE")
                .ok()
                .filter(|s| !s.is_empty()),
            api_token: std::env::var("TAGUM_API_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Header pairs for transports that do not go through reqwest.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(cookie) = &self.session_cookie {
            headers.push(("cookie", cookie.clone()));
        }
        if let Some(token) = &self.api_token {
            headers.push(("authorization", format!("Bearer {token}")));
        }
        headers
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.headers()
            .into_iter()
            .fold(request, |request, (name, value)| request.header(name, value))
    }
}

/// Realtime client configuration
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// API root, e.g. `http://127.0.0.1:8000/projeng/api`
    pub base_url: String,
    /// WebSocket origin, e.g. `ws://127.0.0.1:8000`
    pub ws_base_url: String,
    /// WebSocket accelerator; SSE stays authoritative
    pub enable_websocket: bool,
    pub credentials: Credentials,
    /// GeoJSON FeatureCollection of barangay boundaries
    pub boundary_url: String,
    pub sse_reconnect: ReconnectPolicy,
    pub ws_reconnect: ReconnectPolicy,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        let base_url = "http://127.0.0.1:8000/projeng/api".to_string();
        Self {
            ws_base_url: derive_ws_base(&base_url),
            base_url,
            enable_websocket: false,
            credentials: Credentials::default(),
            boundary_url: "http://127.0.0.1:8000/static/data/tagum_barangays.geojson".to_string(),
            sse_reconnect: ReconnectPolicy::sse_default(),
            ws_reconnect: ReconnectPolicy::websocket_default(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RealtimeConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        let base_url = std::env::var("TAGUM_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(default.base_url);
        let ws_base_url = std::env::var("TAGUM_WS_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| derive_ws_base(&base_url));

        let mut sse_reconnect = default.sse_reconnect;
        if let Some(max) = env_parse::<u32>("TAGUM_RECONNECT_MAX_ATTEMPTS") {
            sse_reconnect.max_attempts = max;
        }
        if let (Some(base), Some(cap)) = (
            env_parse::<u64>("TAGUM_RECONNECT_BASE_MS"),
            env_parse::<u64>("TAGUM_RECONNECT_CAP_MS"),
        ) {
            sse_reconnect.backoff = crate::transport::BackoffPolicy::Exponential {
                base: Duration::from_millis(base),
                cap: Duration::from_millis(cap),
            };
        }

        Self {
            base_url,
            ws_base_url,
            enable_websocket: Self::websocket_enabled(),
            credentials: Credentials::from_env(),
            boundary_url: std::env::var("TAGUM_BOUNDARY_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(default.boundary_url),
            sse_reconnect,
            ws_reconnect: default.ws_reconnect,
            connect_timeout_ms: env_parse("TAGUM_CONNECT_TIMEOUT_MS")
                .unwrap_or(default.connect_timeout_ms),
            request_timeout_ms: env_parse("TAGUM_REQUEST_TIMEOUT_MS")
                .unwrap_or(default.request_timeout_ms),
        }
    }

    /// An explicit disable wins over an explicit enable; default is off.
    pub fn websocket_enabled() -> bool {
        if env_parse::<bool>("TAGUM_DISABLE_WEBSOCKET").unwrap_or(false) {
            return false;
        }
        env_parse::<bool>("TAGUM_ENABLE_WEBSOCKET").unwrap_or(false)
    }

    pub fn sse_url(&self, topic: &StreamTopic) -> String {
        format!("{}{}", self.base_url, topic.sse_path())
    }

    pub fn ws_url(&self, topic: &StreamTopic) -> Option<String> {
        topic
            .ws_path()
            .map(|path| format!("{}{}", self.ws_base_url, path))
    }

    pub fn metadata_url(&self) -> String {
        format!("{}/barangay-metadata/", self.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// `https://host/api` -> `wss://host`, `http://host/api` -> `ws://host`.
pub fn derive_ws_base(base_url: &str) -> String {
    let (scheme, rest) = base_url.split_once("://").unwrap_or(("http", base_url));
    let host = rest.split('/').next().unwrap_or(rest);
    let ws_scheme = if scheme.eq_ignore_ascii_case("https") {
        "wss"
    } else {
        "ws"
    };
    format!("{ws_scheme}://{host}")
}
