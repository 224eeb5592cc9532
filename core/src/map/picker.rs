// Location picker for the project form.
//
// Seeds a marker from the latitude/longitude inputs and moves it on click,
// handing the new coordinates back for the form fields.

use serde::Serialize;

pub const DEFAULT_LAT: f64 = 7.4475;
pub const DEFAULT_LNG: f64 = 125.8078;
pub const PICKER_ZOOM: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationPicker {
    pub lat: f64,
    pub lng: f64,
    pub zoom: u8,
}

impl Default for LocationPicker {
    fn default() -> Self {
        Self {
            lat: DEFAULT_LAT,
            lng: DEFAULT_LNG,
            zoom: PICKER_ZOOM,
        }
    }
}

impl LocationPicker {
    /// Open from the raw input values. Blank, unparsable or zero inputs fall
    /// back to the city default, each axis on its own.
    pub fn open(lat_input: &str, lng_input: &str) -> Self {
        Self {
            lat: parse_coordinate(lat_input).unwrap_or(DEFAULT_LAT),
            lng: parse_coordinate(lng_input).unwrap_or(DEFAULT_LNG),
            zoom: PICKER_ZOOM,
        }
    }

    /// Move the marker; returns the values to write back into the inputs.
    pub fn click(&mut self, lat: f64, lng: f64) -> (String, String) {
        self.lat = lat;
        self.lng = lng;
        self.inputs()
    }

    pub fn inputs(&self) -> (String, String) {
        (self.lat.to_string(), self.lng.to_string())
    }
}

fn parse_coordinate(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_per_axis() {
        let picker = LocationPicker::open("7.5", "");
        assert_eq!(picker.lat, 7.5);
        assert_eq!(picker.lng, DEFAULT_LNG);
        assert_eq!(picker.zoom, 14);
        assert_eq!(LocationPicker::open("abc", "0"), LocationPicker::default());
    }

    #[test]
    fn click_updates_inputs() {
        let mut picker = LocationPicker::default();
        let (lat, lng) = picker.click(7.43, 125.81);
        assert_eq!(lat, "7.43");
        assert_eq!(lng, "125.81");
        assert_eq!(picker.inputs(), (lat, lng));
    }
}
