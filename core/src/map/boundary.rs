// Barangay boundary polygons
//
// Parsed from a GeoJSON `FeatureCollection`. Only the pieces the choropleth
// needs are kept: the region name (the join key), the precomputed colour and
// the overall extent.

use crate::config::Credentials;
use crate::{Result, TagumError};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl Bounds {
    fn point(lng: f64, lat: f64) -> Self {
        Self {
            min_lat: lat,
            min_lng: lng,
            max_lat: lat,
            max_lng: lng,
        }
    }

    fn extend(&mut self, lng: f64, lat: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lng = self.min_lng.min(lng);
        self.max_lat = self.max_lat.max(lat);
        self.max_lng = self.max_lng.max(lng);
    }

    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.min_lng, self.max_lat, self.max_lng]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lng <= self.max_lng
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    /// `properties.color`, used by the projects view
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundarySet {
    regions: Vec<Region>,
    bounds: Option<Bounds>,
}

impl BoundarySet {
    pub fn from_geojson_str(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| TagumError::InvalidBoundary(format!("JSON parse error: {e}")))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| TagumError::InvalidBoundary("not a FeatureCollection".to_string()))?;
        if obj.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(TagumError::InvalidBoundary(
                "not a FeatureCollection".to_string(),
            ));
        }
        let features = obj
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| TagumError::InvalidBoundary("missing features".to_string()))?;

        let mut regions = Vec::with_capacity(features.len());
        let mut bounds: Option<Bounds> = None;

        for (index, feature) in features.iter().enumerate() {
            let properties = feature.get("properties").and_then(Value::as_object);
            let name = properties
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TagumError::InvalidBoundary(format!("feature {index} missing properties.name"))
                })?;
            let color = properties
                .and_then(|p| p.get("color"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            if let Some(geometry) = feature.get("geometry") {
                extend_bounds(&mut bounds, geometry);
            }

            regions.push(Region {
                name: name.to_string(),
                color,
            });
        }

        Ok(Self { regions, bounds })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.iter().any(|r| r.name == name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.regions.iter().map(|r| r.name.clone()).collect()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }
}

fn extend_bounds(bounds: &mut Option<Bounds>, geometry: &Value) {
    let Some(coords) = geometry.get("coordinates") else {
        return;
    };
    if !matches!(
        geometry.get("type").and_then(Value::as_str),
        Some("Polygon") | Some("MultiPolygon")
    ) {
        return;
    }
    visit_positions(coords, &mut |lng, lat| match bounds.as_mut() {
        Some(b) => b.extend(lng, lat),
        None => *bounds = Some(Bounds::point(lng, lat)),
    });
}

/// Walk nested coordinate arrays down to `[lng, lat]` pairs.
fn visit_positions(value: &Value, f: &mut dyn FnMut(f64, f64)) {
    let Some(items) = value.as_array() else {
        return;
    };
    if let [Value::Number(lng), Value::Number(lat), ..] = items.as_slice() {
        if let (Some(lng), Some(lat)) = (lng.as_f64(), lat.as_f64()) {
            f(lng, lat);
        }
        return;
    }
    for item in items {
        visit_positions(item, f);
    }
}

/// Where boundary polygons come from.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    async fn load_boundaries(&self) -> Result<BoundarySet>;
}

pub struct HttpBoundarySource {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl HttpBoundarySource {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            credentials,
            timeout,
        }
    }
}

#[async_trait]
impl BoundarySource for HttpBoundarySource {
    async fn load_boundaries(&self) -> Result<BoundarySet> {
        let request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/geo+json, application/json")
            .timeout(self.timeout);
        let response = self.credentials.apply(request).send().await?;
        if let Some(err) = TagumError::from_status(response.status().as_u16()) {
            return Err(err);
        }

        let value: Value = response.json().await?;
        let set = BoundarySet::from_geojson_value(&value)?;
        info!(target: "choropleth", url = %self.url, features = set.len(), "Loaded barangay boundaries");
        Ok(set)
    }
}
