use crate::core::geo::LatLng;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A GeoJSON position. Servers may append elevation, so this is not fixed-size.
pub type Position = Vec<f64>;

/// GeoJSON feature types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point {
        coordinates: Position,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJsonGeometry>,
    },
}

impl GeoJsonGeometry {
    pub fn point(lat_lng: LatLng) -> Self {
        Self::Point {
            coordinates: vec![lat_lng.lng, lat_lng.lat],
        }
    }

    pub fn line(from: LatLng, to: LatLng) -> Self {
        Self::LineString {
            coordinates: vec![vec![from.lng, from.lat], vec![to.lng, to.lat]],
        }
    }
}

/// An unreadable geometry is dropped rather than failing the whole feature.
fn lenient_geometry<'de, D>(deserializer: D) -> Result<Option<GeoJsonGeometry>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| GeoJsonGeometry::deserialize(v).ok()))
}

/// GeoJSON feature with geometry and properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_geometry")]
    pub geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    pub properties: Option<HashMap<String, serde_json::Value>>,
}

impl GeoJsonFeature {
    pub fn new(
        id: impl Into<serde_json::Value>,
        geometry: GeoJsonGeometry,
        properties: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            geometry: Some(geometry),
            properties: Some(properties),
        }
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.as_ref().and_then(|props| props.get(key))
    }
}

/// Root GeoJSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJson {
    Feature(GeoJsonFeature),
    FeatureCollection { features: Vec<GeoJsonFeature> },
    Geometry(GeoJsonGeometry),
}

impl GeoJson {
    /// Parses a GeoJSON document from raw bytes
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Flattens the document into its features. Bare geometries carry none.
    pub fn into_features(self) -> Vec<GeoJsonFeature> {
        match self {
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::FeatureCollection { features } => features,
            GeoJson::Geometry(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_collection_with_server_extras() {
        let body = br#"{
            "type": "FeatureCollection",
            "totalFeatures": "unknown",
            "numberReturned": 1,
            "features": [{
                "type": "Feature",
                "id": "roads.17",
                "geometry_name": "geom",
                "geometry": {"type": "Point", "coordinates": [72.8, 19.0, 12.5]},
                "properties": {"name": "Marine Drive"}
            }],
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}}
        }"#;

        let features = GeoJson::from_slice(body).unwrap().into_features();
        assert_eq!(features.len(), 1);
        assert_eq!(
            features[0].property("name"),
            Some(&serde_json::json!("Marine Drive"))
        );
        assert!(matches!(
            features[0].geometry,
            Some(GeoJsonGeometry::Point { ref coordinates }) if coordinates.len() == 3
        ));
    }

    #[test]
    fn test_unknown_geometry_is_dropped() {
        let body = br#"{"type": "Feature", "geometry": {"type": "Circle"}, "properties": null}"#;
        let features = GeoJson::from_slice(body).unwrap().into_features();
        assert_eq!(features.len(), 1);
        assert!(features[0].geometry.is_none());
    }

    #[test]
    fn test_bare_geometry_has_no_features() {
        let geometry = GeoJson::Geometry(GeoJsonGeometry::point(LatLng::new(1.0, 2.0)));
        assert!(geometry.into_features().is_empty());
    }

    #[test]
    fn test_invalid_document_is_error() {
        assert!(GeoJson::from_slice(b"<html>").is_err());
    }
}
