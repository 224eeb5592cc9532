// Barangay metadata
//
// Zoning classes and demographics from `GET /barangay-metadata/`. Class values
// the client does not know deserialize to `None` so one odd row never fails
// the whole payload.

use crate::config::Credentials;
use crate::stats::lenient_f64;
use crate::{Result, TagumError};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarangayClass {
    Urban,
    Rural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EconomicClass {
    GrowthCenter,
    Emerging,
    Satellite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationType {
    Highland,
    Plains,
    Coastal,
}

impl BarangayClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "urban" => Some(Self::Urban),
            "rural" => Some(Self::Rural),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Urban => "Urban",
            Self::Rural => "Rural",
        }
    }
}

impl EconomicClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "growth_center" => Some(Self::GrowthCenter),
            "emerging" => Some(Self::Emerging),
            "satellite" => Some(Self::Satellite),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::GrowthCenter => "Growth Center",
            Self::Emerging => "Emerging",
            Self::Satellite => "Satellite",
        }
    }
}

impl ElevationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "highland" => Some(Self::Highland),
            "plains" => Some(Self::Plains),
            "coastal" => Some(Self::Coastal),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Highland => "Highland",
            Self::Plains => "Plains",
            Self::Coastal => "Coastal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionMetadata {
    pub name: String,
    #[serde(deserialize_with = "de_barangay_class")]
    pub barangay_class: Option<BarangayClass>,
    #[serde(deserialize_with = "de_economic_class")]
    pub economic_class: Option<EconomicClass>,
    #[serde(deserialize_with = "de_elevation_type")]
    pub elevation_type: Option<ElevationType>,
    #[serde(deserialize_with = "de_number")]
    pub population: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub density: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub growth_rate: Option<f64>,
}

fn de_class<'de, D, T>(
    deserializer: D,
    parse: fn(&str) -> Option<T>,
) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| parse(s.trim())))
}

fn de_barangay_class<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<BarangayClass>, D::Error> {
    de_class(deserializer, BarangayClass::parse)
}

fn de_economic_class<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<EconomicClass>, D::Error> {
    de_class(deserializer, EconomicClass::parse)
}

fn de_elevation_type<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ElevationType>, D::Error> {
    de_class(deserializer, ElevationType::parse)
}

fn de_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_f64(&value))
}

/// Metadata keyed by barangay name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataIndex {
    regions: BTreeMap<String, RegionMetadata>,
}

impl MetadataIndex {
    pub fn get(&self, name: &str) -> Option<&RegionMetadata> {
        self.regions.get(name)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn insert(&mut self, metadata: RegionMetadata) {
        self.regions.insert(metadata.name.clone(), metadata);
    }
}

impl FromIterator<RegionMetadata> for MetadataIndex {
    fn from_iter<I: IntoIterator<Item = RegionMetadata>>(iter: I) -> Self {
        let mut index = MetadataIndex::default();
        for metadata in iter {
            index.insert(metadata);
        }
        index
    }
}

/// Index a `{"barangays": [...]}` payload. Any other shape yields an empty
/// index; rows that do not deserialize are skipped.
pub fn index_metadata(payload: &Value) -> MetadataIndex {
    let Some(rows) = payload.get("barangays").and_then(Value::as_array) else {
        warn!(target: "metadata", "Unexpected barangay metadata format");
        return MetadataIndex::default();
    };

    rows.iter()
        .filter_map(|row| match RegionMetadata::deserialize(row) {
            Ok(metadata) if !metadata.name.is_empty() => Some(metadata),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "metadata", error = %e, "Skipping barangay metadata row");
                None
            }
        })
        .collect()
}

/// Where barangay metadata comes from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn load_metadata(&self) -> Result<MetadataIndex>;
}

pub struct HttpMetadataSource {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl HttpMetadataSource {
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
impl MetadataSource for HttpMetadataSource {
    async fn load_metadata(&self) -> Result<MetadataIndex> {
        let request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        let response = self.credentials.apply(request).send().await?;

        if let Some(err) = TagumError::from_status(response.status().as_u16()) {
            match &err {
                TagumError::Unauthorized => {
                    error!(target: "metadata", "Authentication required, please log in")
                }
                TagumError::Forbidden => {
                    error!(target: "metadata", "Access forbidden, no permission to view barangay metadata")
                }
                other => error!(target: "metadata", error = %other, "Barangay metadata request failed"),
            }
            return Err(err);
        }

        let payload: Value = response.json().await?;
        let index = index_metadata(&payload);
        info!(target: "metadata", barangays = index.len(), "Barangay metadata loaded");
        Ok(index)
    }
}
