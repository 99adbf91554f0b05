use geo::{Bearing, Distance, Geodesic, Point};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Geodesic distance in meters and initial compass bearing in degrees (0..360).
    pub fn distance_and_bearing(&self, other: &Position) -> (f64, f64) {
        let start = Point::new(self.lng, self.lat);
        let end = Point::new(other.lng, other.lat);
        let distance = Geodesic.distance(start, end);
        let bearing = (Geodesic.bearing(start, end) + 360.0) % 360.0;
        (distance, bearing)
    }
}

/// Coordinates rounded to two decimals, as shown on pins and popups.
pub fn format_coords(position: &Position) -> String {
    format!("{:.2}, {:.2}", position.lat, position.lng)
}

/// < 1000m: whole meters, otherwise km with 2 decimal places
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 { format!("{:.0} m", meters) } else { format!("{:.2} km", meters / 1000.0) }
}

pub fn format_bearing(degrees: f64) -> String {
    let directions = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let idx = ((degrees + 22.5) / 45.0) as usize % 8;
    format!("{:.0}° {}", degrees, directions[idx])
}

/// A named point from the city feed. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub position: Position,
}

impl City {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self { name: name.into(), position: Position::new(lat, lng) }
    }

    /// Pin glyph: name followed by the rounded coordinates.
    pub fn glyph(&self) -> String {
        format!("{} {}", self.name, format_coords(&self.position))
    }

    /// Info popup text. When the viewer's position is known a second line
    /// gives distance and bearing from the viewer to this city.
    pub fn popup_content(&self, viewer: Option<&Position>) -> String {
        let mut content = format!("Marker at {}", format_coords(&self.position));
        if let Some(viewer) = viewer {
            let (distance, bearing) = viewer.distance_and_bearing(&self.position);
            content.push('\n');
            content.push_str(&format!(
                "{} @ {} from you",
                format_distance(distance),
                format_bearing(bearing)
            ));
        }
        content
    }
}

/// Wire shape of one entry in the `/markers` feed.
#[derive(Debug, Clone, Deserialize)]
pub struct CityRecord {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl From<CityRecord> for City {
    fn from(record: CityRecord) -> Self {
        City { name: record.name, position: Position::new(record.lat, record.lng) }
    }
}
