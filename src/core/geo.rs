use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::constants::WEB_MERCATOR;

/// Web Mercator projection constants
const EARTH_RADIUS: f64 = 6378137.0;
const MAX_LATITUDE: f64 = 85.0511287798;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Flat angular separation in radians, `sqrt(dlat² + dlng²)`.
    ///
    /// Cheap proximity test for points a few metres apart; not a distance.
    pub fn angular_separation(&self, other: &LatLng) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        (d_lat * d_lat + d_lng * d_lng).sqrt()
    }

    /// Clamps latitude to valid range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Converts to Web Mercator projection (EPSG:3857)
    pub fn to_mercator(&self) -> Point {
        let lat = Self::clamp_lat(self.lat);
        let x = self.lng.to_radians() * EARTH_RADIUS;
        let y = ((PI / 4.0 + lat.to_radians() / 2.0).tan().ln()) * EARTH_RADIUS;
        Point::new(x, y)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in projected (map) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Distance from this point to the segment `a`-`b`.
    pub fn distance_to_segment(&self, a: &Point, b: &Point) -> f64 {
        let ab = b.subtract(a);
        let len_sq = ab.x * ab.x + ab.y * ab.y;
        if len_sq == 0.0 {
            return self.distance_to(a);
        }
        let ap = self.subtract(a);
        let t = ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0);
        let projection = Point::new(a.x + ab.x * t, a.y + ab.y * t);
        self.distance_to(&projection)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// The state of the map view a click happened in.
///
/// `resolution` is map units per screen pixel in `projection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub resolution: f64,
    pub projection: String,
}

impl ViewState {
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            projection: WEB_MERCATOR.to_string(),
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mercator() {
        let origin = LatLng::new(0.0, 0.0).to_mercator();
        assert!(origin.x.abs() < 1e-9 && origin.y.abs() < 1e-9);

        let east = LatLng::new(0.0, 180.0).to_mercator();
        assert!((east.x - 20037508.342789244).abs() < 1e-6);

        // Latitudes beyond the Mercator limit are clamped.
        let pole = LatLng::new(90.0, 0.0).to_mercator();
        assert!(pole.y.is_finite());
    }

    #[test]
    fn test_angular_separation() {
        let a = LatLng::new(10.0, 20.0);
        let b = LatLng::new(10.0, 20.01);
        let expected = 0.01_f64.to_radians();
        assert!((a.angular_separation(&b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_distance_to_segment() {
        let p = Point::new(5.0, 3.0);
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!((p.distance_to_segment(&a, &b) - 3.0).abs() < 1e-12);
        let beyond = Point::new(13.0, 4.0);
        assert!((beyond.distance_to_segment(&a, &b) - 5.0).abs() < 1e-12);
    }
}
