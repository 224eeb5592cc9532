// Barangay map
//
// Boundary and metadata loading, the categorical palette and the choropleth
// state machine. Rendering goes through `ports::MapPort`.

pub mod boundary;
pub mod choropleth;
pub mod metadata;
pub mod palette;
pub mod picker;

pub use boundary::{BoundarySet, BoundarySource, Bounds, HttpBoundarySource, Region};
pub use choropleth::ChoroplethRenderer;
pub use metadata::{HttpMetadataSource, MetadataIndex, MetadataSource, RegionMetadata};
pub use picker::LocationPicker;

use crate::TagumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tagum City centre used when no boundary extent is available.
pub const TAGUM_CENTER: (f64, f64) = (7.4475, 125.8096);
pub const TAGUM_ZOOM: u8 = 12;

/// Thematic view of the choropleth. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Projects,
    UrbanRural,
    Economic,
    Elevation,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Projects,
        ViewMode::UrbanRural,
        ViewMode::Economic,
        ViewMode::Elevation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Projects => "projects",
            ViewMode::UrbanRural => "urban_rural",
            ViewMode::Economic => "economic",
            ViewMode::Elevation => "elevation",
        }
    }

    /// Legend heading.
    pub fn title(&self) -> &'static str {
        match self {
            ViewMode::Projects => "Tagum City Barangays",
            ViewMode::UrbanRural => "Urban / Rural",
            ViewMode::Economic => "Economic Classification",
            ViewMode::Elevation => "Elevation Type",
        }
    }

    /// Colours come from barangay metadata rather than the boundary file.
    pub fn needs_metadata(&self) -> bool {
        !matches!(self, ViewMode::Projects)
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = TagumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| TagumError::Config(format!("Unknown view mode: {s}")))
    }
}

/// Where the map should look after a render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Viewport {
    FitBounds(Bounds),
    Center { lat: f64, lng: f64, zoom: u8 },
}

impl Viewport {
    /// Fit the boundary extent, or fall back to the city centre.
    pub fn for_bounds(bounds: Option<Bounds>) -> Self {
        match bounds.filter(Bounds::is_valid) {
            Some(bounds) => Viewport::FitBounds(bounds),
            None => Viewport::Center {
                lat: TAGUM_CENTER.0,
                lng: TAGUM_CENTER.1,
                zoom: TAGUM_ZOOM,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_mode_round_trips_through_str() {
        for mode in ViewMode::ALL {
            assert_eq!(mode.as_str().parse::<ViewMode>().unwrap(), mode);
        }
        assert!("satellite".parse::<ViewMode>().is_err());
        assert!(!ViewMode::Projects.needs_metadata());
        assert!(ViewMode::Elevation.needs_metadata());
    }

    #[test]
    fn viewport_falls_back_to_city_centre() {
        assert_eq!(
            Viewport::for_bounds(None),
            Viewport::Center {
                lat: 7.4475,
                lng: 125.8096,
                zoom: 12
            }
        );
    }
}
