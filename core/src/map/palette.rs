use super::metadata::{BarangayClass, EconomicClass, ElevationType, RegionMetadata};
use super::ViewMode;
use serde::Serialize;

/// Projects view fill when a feature has no `color` property.
pub const PROJECT_DEFAULT: &str = "#FF6B6B";

/// Metadata views fill when the barangay has no (usable) class.
pub const NO_DATA: &str = "#cccccc";

/// A legend category. Colours are not unique across categories (rural and
/// satellite share one), so the label is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Category {
    pub label: &'static str,
    pub color: &'static str,
}

const fn category(label: &'static str, color: &'static str) -> Category {
    Category { label, color }
}

const URBAN_RURAL: [Category; 2] = [category("Urban", "#ef4444"), category("Rural", "#fbbf24")];

const ECONOMIC: [Category; 3] = [
    category("Growth Center", "#3b82f6"),
    category("Emerging", "#10b981"),
    category("Satellite", "#fbbf24"),
];

const ELEVATION: [Category; 3] = [
    category("Highland", "#8b5cf6"),
    category("Plains", "#84cc16"),
    category("Coastal", "#06b6d4"),
];

/// Fixed key of a metadata view, in legend order. Empty for the projects view.
pub fn categories(mode: ViewMode) -> &'static [Category] {
    match mode {
        ViewMode::Projects => &[],
        ViewMode::UrbanRural => &URBAN_RURAL,
        ViewMode::Economic => &ECONOMIC,
        ViewMode::Elevation => &ELEVATION,
    }
}

/// Category of one barangay under `mode`, if its metadata classifies it.
pub fn category_for(mode: ViewMode, metadata: Option<&RegionMetadata>) -> Option<Category> {
    let metadata = metadata?;
    let index = match mode {
        ViewMode::Projects => return None,
        ViewMode::UrbanRural => match metadata.barangay_class? {
            BarangayClass::Urban => 0,
            BarangayClass::Rural => 1,
        },
        ViewMode::Economic => match metadata.economic_class? {
            EconomicClass::GrowthCenter => 0,
            EconomicClass::Emerging => 1,
            EconomicClass::Satellite => 2,
        },
        ViewMode::Elevation => match metadata.elevation_type? {
            ElevationType::Highland => 0,
            ElevationType::Plains => 1,
            ElevationType::Coastal => 2,
        },
    };
    categories(mode).get(index).copied()
}
