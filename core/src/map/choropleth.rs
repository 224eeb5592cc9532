// Choropleth Renderer
//
// State machine over `ViewMode`. Owns the boundary set, the (lazily loaded)
// barangay metadata and the latest project list, and projects them onto a
// `MapPort` as a full layer, a legend and a summary panel.

use super::boundary::{BoundarySet, BoundarySource};
use super::metadata::{MetadataIndex, MetadataSource, RegionMetadata};
use super::palette::{self, Category};
use super::{ViewMode, Viewport};
use crate::ports::MapPort;
use crate::stats::{self, ProjectRecord, ProjectSummary, RegionStat};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const BORDER_COLOR: &str = "#333";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStyle {
    pub fill_color: String,
    pub color: String,
    pub weight: u8,
    pub opacity: f64,
    pub fill_opacity: f64,
}

impl RegionStyle {
    pub fn base(fill_color: impl Into<String>) -> Self {
        Self {
            fill_color: fill_color.into(),
            color: BORDER_COLOR.to_string(),
            weight: 2,
            opacity: 1.0,
            fill_opacity: 0.7,
        }
    }

    /// Hover emphasis: heavier border, more opaque fill.
    pub fn highlighted(&self) -> Self {
        Self {
            weight: 3,
            fill_opacity: 0.9,
            ..self.clone()
        }
    }
}

/// Zoning block of a popup, with labels already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSummary {
    pub classification: Option<&'static str>,
    pub economic_type: Option<&'static str>,
    pub elevation: Option<&'static str>,
    pub population: Option<f64>,
    pub density: Option<f64>,
    pub growth_rate: Option<f64>,
}

impl From<&RegionMetadata> for MetadataSummary {
    fn from(metadata: &RegionMetadata) -> Self {
        Self {
            classification: metadata.barangay_class.map(|c| c.label()),
            economic_type: metadata.economic_class.map(|c| c.label()),
            elevation: metadata.elevation_type.map(|c| c.label()),
            population: metadata.population,
            density: metadata.density,
            growth_rate: metadata.growth_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPopup {
    pub name: String,
    pub metadata: Option<MetadataSummary>,
    /// Zeroed when the barangay has no projects
    pub stats: RegionStat,
}

impl fmt::Display for RegionPopup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;

        if let Some(meta) = &self.metadata {
            writeln!(f, "Zoning Information")?;
            writeln!(f, "  Classification: {}", meta.classification.unwrap_or("N/A"))?;
            writeln!(f, "  Economic Type: {}", meta.economic_type.unwrap_or("N/A"))?;
            writeln!(f, "  Elevation: {}", meta.elevation.unwrap_or("N/A"))?;
            if let Some(population) = meta.population.filter(|p| *p != 0.0) {
                writeln!(f, "  Population: {}", stats::group_thousands(population))?;
            }
            if let Some(density) = meta.density.filter(|d| *d != 0.0) {
                writeln!(f, "  Density: {} /km²", stats::group_thousands(density))?;
            }
            if let Some(rate) = meta.growth_rate.filter(|r| *r != 0.0) {
                writeln!(f, "  Growth Rate: {rate}%")?;
            }
        }

        writeln!(f, "Project Statistics")?;
        writeln!(f, "  Total Projects: {}", self.stats.total_projects)?;
        writeln!(f, "  Total Cost: {}", stats::format_currency(self.stats.total_cost))?;
        writeln!(f, "  Completed: {}", self.stats.completed_projects)?;
        writeln!(f, "  Ongoing: {}", self.stats.ongoing_projects)?;
        write!(f, "  Planned: {}", self.stats.planned_projects)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRegion {
    pub name: String,
    /// Legend category in metadata views; `None` means the gray default
    pub category: Option<&'static str>,
    pub style: RegionStyle,
    pub popup: RegionPopup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethLayer {
    pub mode: ViewMode,
    pub regions: Vec<RenderedRegion>,
}

impl ChoroplethLayer {
    pub fn region(&self, name: &str) -> Option<&RenderedRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
    /// Coloured regions in this category; `None` in the projects view
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub mode: ViewMode,
    pub title: &'static str,
    pub entries: Vec<LegendEntry>,
    /// Regions left at the gray default
    pub unclassified: usize,
}

pub struct ChoroplethRenderer {
    port: Arc<dyn MapPort>,
    boundary_source: Arc<dyn BoundarySource>,
    metadata_source: Arc<dyn MetadataSource>,

    boundaries: BoundarySet,
    metadata: MetadataIndex,
    records: Vec<ProjectRecord>,
    stats: BTreeMap<String, RegionStat>,

    current_view: ViewMode,
    layer: Option<ChoroplethLayer>,
    legend: Option<Legend>,
    summary: Option<ProjectSummary>,
}

impl ChoroplethRenderer {
    pub fn new(
        port: Arc<dyn MapPort>,
        boundary_source: Arc<dyn BoundarySource>,
        metadata_source: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            port,
            boundary_source,
            metadata_source,
            boundaries: BoundarySet::default(),
            metadata: MetadataIndex::default(),
            records: Vec::new(),
            stats: BTreeMap::new(),
            current_view: ViewMode::Projects,
            layer: None,
            legend: None,
            summary: None,
        }
    }

    /// Load boundaries (required) and metadata (best effort), then render the
    /// projects view and position the map.
    pub async fn initialize(&mut self, records: Vec<ProjectRecord>) -> Result<Viewport> {
        info!(target: "choropleth", "Initializing choropleth...");

        self.boundaries = self.boundary_source.load_boundaries().await.map_err(|e| {
            error!(target: "choropleth", error = %e, "Failed to load barangay boundaries");
            e
        })?;

        self.metadata = match self.metadata_source.load_metadata().await {
            Ok(index) => index,
            Err(e) => {
                error!(target: "choropleth", error = %e, "Error loading barangay metadata");
                MetadataIndex::default()
            }
        };

        self.current_view = ViewMode::Projects;
        self.set_records(records);
        self.render_view();
        self.render_summary();

        let viewport = Viewport::for_bounds(self.boundaries.bounds());
        self.port.set_viewport(&viewport);

        info!(
            target: "choropleth",
            barangays = self.boundaries.len(),
            with_metadata = self.metadata.len(),
            "Choropleth initialized"
        );
        Ok(viewport)
    }

    /// Switch the thematic view.
    ///
    /// Metadata views fetch metadata on first use and retry the switch once
    /// with the result. A failed fetch leaves the current layer and view as
    /// they were.
    pub async fn switch_view(&mut self, mode: ViewMode) -> Result<()> {
        debug!(target: "choropleth", from = %self.current_view, to = %mode, "Switching view");

        if mode.needs_metadata() && self.metadata.is_empty() {
            warn!(target: "choropleth", view = %mode, "Barangay metadata not loaded yet, loading");
            match self.metadata_source.load_metadata().await {
                Ok(index) => self.metadata = index,
                Err(e) => {
                    error!(target: "choropleth", view = %mode, error = %e, "Failed to load barangay metadata");
                    return Err(e);
                }
            }
            if self.metadata.is_empty() {
                warn!(target: "choropleth", view = %mode, "No barangay metadata after reload, rendering unclassified");
            }
        }

        self.current_view = mode;
        self.render_view();
        info!(target: "choropleth", view = %mode, "View switched");
        Ok(())
    }

    /// Replace the project list, recompute statistics in full and re-render.
    pub fn refresh(&mut self, records: Vec<ProjectRecord>) {
        self.set_records(records);
        self.render_view();
        self.render_summary();
    }

    pub fn hover(&self, region: &str) -> bool {
        let Some(rendered) = self.layer.as_ref().and_then(|l| l.region(region)) else {
            return false;
        };
        self.port.set_region_style(region, &rendered.style.highlighted());
        self.port.bring_to_front(region);
        true
    }

    pub fn hover_exit(&self, region: &str) -> bool {
        let Some(rendered) = self.layer.as_ref().and_then(|l| l.region(region)) else {
            return false;
        };
        self.port.set_region_style(region, &rendered.style);
        true
    }

    /// Remove everything this renderer put on the map.
    pub fn cleanup(&mut self) {
        if self.layer.take().is_some() {
            self.port.remove_layer();
        }
        if self.legend.take().is_some() {
            self.port.remove_legend();
        }
        if self.summary.take().is_some() {
            self.port.remove_summary();
        }
        debug!(target: "choropleth", "Choropleth cleanup completed");
    }

    pub fn current_view(&self) -> ViewMode {
        self.current_view
    }

    pub fn layer(&self) -> Option<&ChoroplethLayer> {
        self.layer.as_ref()
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn summary(&self) -> Option<&ProjectSummary> {
        self.summary.as_ref()
    }

    pub fn stats(&self) -> &BTreeMap<String, RegionStat> {
        &self.stats
    }

    pub fn boundaries(&self) -> &BoundarySet {
        &self.boundaries
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    fn set_records(&mut self, records: Vec<ProjectRecord>) {
        self.records = records;
        self.stats = stats::aggregate(&self.records);
    }

    fn render_view(&mut self) {
        if self.boundaries.is_empty() {
            error!(target: "choropleth", "No barangay data available");
            return;
        }

        let layer = self.build_layer(self.current_view);
        let legend = build_legend(&layer, &self.boundaries);

        if self.layer.is_some() {
            self.port.remove_layer();
        }
        self.port.render_layer(&layer);

        if self.legend.is_some() {
            self.port.remove_legend();
        }
        self.port.render_legend(&legend);

        debug!(
            target: "choropleth",
            view = %layer.mode,
            classified = layer.regions.len() - legend.unclassified,
            unclassified = legend.unclassified,
            "Layer rendered"
        );
        self.layer = Some(layer);
        self.legend = Some(legend);
    }

    fn render_summary(&mut self) {
        let valid = self.boundaries.names();
        let summary = stats::summarize(&self.records, &valid);

        let hidden = stats::hidden_delayed(&self.records, &valid);
        if !hidden.is_empty() {
            let ids: Vec<u64> = hidden.iter().filter_map(|r| r.id).collect();
            warn!(
                target: "choropleth",
                count = hidden.len(),
                ids = ?ids,
                "Delayed projects not shown on the map (missing coordinates or unknown barangay)"
            );
        }

        if self.summary.is_some() {
            self.port.remove_summary();
        }
        self.port.render_summary(&summary);
        self.summary = Some(summary);
    }

    fn build_layer(&self, mode: ViewMode) -> ChoroplethLayer {
        let regions = self
            .boundaries
            .regions()
            .iter()
            .map(|region| {
                let metadata = self.metadata.get(&region.name);
                let (category, fill) = match mode {
                    ViewMode::Projects => (
                        None,
                        region.color.as_deref().unwrap_or(palette::PROJECT_DEFAULT),
                    ),
                    _ => match palette::category_for(mode, metadata) {
                        Some(Category { label, color }) => (Some(label), color),
                        None => (None, palette::NO_DATA),
                    },
                };

                RenderedRegion {
                    name: region.name.clone(),
                    category,
                    style: RegionStyle::base(fill),
                    popup: RegionPopup {
                        name: region.name.clone(),
                        metadata: metadata.map(MetadataSummary::from),
                        stats: self.stats.get(&region.name).cloned().unwrap_or_default(),
                    },
                }
            })
            .collect();

        ChoroplethLayer { mode, regions }
    }
}

fn build_legend(layer: &ChoroplethLayer, boundaries: &BoundarySet) -> Legend {
    if layer.mode == ViewMode::Projects {
        // Sorted unique names; the first colour seen for a name wins
        let mut unique: BTreeMap<&str, &str> = BTreeMap::new();
        for region in boundaries.regions() {
            unique
                .entry(region.name.as_str())
                .or_insert_with(|| region.color.as_deref().unwrap_or(palette::PROJECT_DEFAULT));
        }
        return Legend {
            mode: layer.mode,
            title: layer.mode.title(),
            entries: unique
                .into_iter()
                .map(|(name, color)| LegendEntry {
                    label: name.to_string(),
                    color: color.to_string(),
                    count: None,
                })
                .collect(),
            unclassified: 0,
        };
    }

    let entries = palette::categories(layer.mode)
        .iter()
        .map(|category| LegendEntry {
            label: category.label.to_string(),
            color: category.color.to_string(),
            count: Some(
                layer
                    .regions
                    .iter()
                    .filter(|r| r.category == Some(category.label))
                    .count(),
            ),
        })
        .collect();

    Legend {
        mode: layer.mode,
        title: layer.mode.title(),
        entries,
        unclassified: layer.regions.iter().filter(|r| r.category.is_none()).count(),
    }
}
