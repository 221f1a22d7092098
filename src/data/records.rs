//! Project layer records as served by the project metadata API.
//!
//! Field names follow the backend's JSON. Ids arrive as numbers or strings and
//! are normalized to strings; coordinates may arrive as numbers, numeric
//! strings or null.

use crate::core::constants::MIN_COORDINATE_MAGNITUDE;
use crate::core::geo::LatLng;
use crate::layers::base::LayerKind;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a number or string id, got {}",
            other
        ))),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Whole, non-negative sizes sent as integers, floats like `6000.0` or
/// numeric strings. Anything else reads as unknown.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32))
}

/// Raster layer published on the tile service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterRecord {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "geoserver_url", default)]
    pub service_url: String,
    #[serde(rename = "geoserver_layer_name", default)]
    pub service_layer_name: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub band_count: Option<u32>,
    /// `[minx, miny, maxx, maxy]` in `crs`
    #[serde(default)]
    pub bounding_box: Option<[f64; 4]>,
    #[serde(default)]
    pub crs: Option<String>,
}

impl RasterRecord {
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.file_name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.service_layer_name.as_str())
    }
}

/// Vector layer published on the tile service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(rename = "geoserver_url", default)]
    pub service_url: String,
    #[serde(rename = "geoserver_layer_name", default)]
    pub service_layer_name: String,
    #[serde(default)]
    pub crs: Option<String>,
}

impl VectorRecord {
    pub fn name(&self) -> &str {
        [&self.display_name, &self.title, &self.name]
            .into_iter()
            .filter_map(|name| name.as_deref())
            .find(|name| !name.is_empty())
            .unwrap_or(self.service_layer_name.as_str())
    }

    /// Name the layer is published under; older records only carry `name`.
    pub fn layer_name(&self) -> Option<&str> {
        Some(self.service_layer_name.as_str())
            .filter(|name| !name.is_empty())
            .or_else(|| self.name.as_deref().filter(|name| !name.is_empty()))
    }
}

/// Geo-tagged street image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub s3_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub captured_at: Option<String>,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub processing_status: Option<String>,
    /// Backend-rendered overlay of the project's images, `…/wms?layers=ws:name`
    #[serde(default)]
    pub geoserver_layer_url: Option<String>,
}

impl ImageRecord {
    pub fn name(&self) -> &str {
        self.original_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(self.id.as_str())
    }

    /// Direct image URL: the object-storage URL when present, else the file path.
    pub fn image_url(&self) -> Option<&str> {
        self.s3_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.file_path.as_deref().filter(|url| !url.trim().is_empty()))
    }

    /// Position of the image, or `None` when missing, non-finite or near (0, 0).
    pub fn position(&self) -> Option<LatLng> {
        let (lat, lng) = (self.latitude?, self.longitude?);
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if lng.abs() <= MIN_COORDINATE_MAGNITUDE && lat.abs() <= MIN_COORDINATE_MAGNITUDE {
            return None;
        }
        Some(LatLng::new(lat, lng))
    }
}

/// Background reference layer drawn from an XYZ template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub id: String,
    pub display_name: String,
    pub url_template: String,
}

impl BaseRecord {
    /// The built-in base layers: street map, satellite imagery and terrain.
    pub fn builtin() -> Vec<BaseRecord> {
        vec![
            BaseRecord {
                id: "osm".to_string(),
                display_name: "OpenStreetMap".to_string(),
                url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            },
            BaseRecord {
                id: "satellite".to_string(),
                display_name: "Satellite".to_string(),
                url_template: "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}".to_string(),
            },
            BaseRecord {
                id: "terrain".to_string(),
                display_name: "Terrain".to_string(),
                url_template: "https://{a-c}.tile.opentopomap.org/{z}/{x}/{y}.png".to_string(),
            },
        ]
    }
}

/// One layer record of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerRecord {
    Vector(VectorRecord),
    Raster(RasterRecord),
    StreetImage(ImageRecord),
    Base(BaseRecord),
}

impl LayerRecord {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Vector(_) => LayerKind::Vector,
            Self::Raster(_) => LayerKind::Raster,
            Self::StreetImage(_) => LayerKind::StreetImage,
            Self::Base(_) => LayerKind::Base,
        }
    }

    /// Id of the layer handle built from this record.
    pub fn layer_id(&self) -> String {
        match self {
            Self::Vector(record) => format!("vector_{}", record.id),
            Self::Raster(record) => format!("raster_{}", record.id),
            Self::StreetImage(record) => format!("street_image_{}", record.id),
            Self::Base(record) => record.id.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Vector(record) => record.name(),
            Self::Raster(record) => record.name(),
            Self::StreetImage(record) => record.name(),
            Self::Base(record) => &record.display_name,
        }
    }

    pub fn service_url(&self) -> Option<&str> {
        match self {
            Self::Vector(record) => Some(&record.service_url),
            Self::Raster(record) => Some(&record.service_url),
            Self::StreetImage(record) => record.geoserver_layer_url.as_deref(),
            Self::Base(record) => Some(&record.url_template),
        }
    }

    pub fn service_layer_name(&self) -> Option<&str> {
        match self {
            Self::Vector(record) => record.layer_name(),
            Self::Raster(record) => Some(&record.service_layer_name),
            Self::StreetImage(_) | Self::Base(_) => None,
        }
    }
}

/// Every layer record belonging to one project. Replaced wholesale on reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectLayerSet {
    pub project_id: String,
    #[serde(default)]
    pub vector_layers: Vec<VectorRecord>,
    #[serde(default)]
    pub raster_layers: Vec<RasterRecord>,
    #[serde(default)]
    pub street_images: Vec<ImageRecord>,
}

impl ProjectLayerSet {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Builds a set from the three endpoint payloads, skipping malformed elements.
    pub fn from_payloads(
        project_id: impl Into<String>,
        vector: &serde_json::Value,
        raster: &serde_json::Value,
        images: &serde_json::Value,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            vector_layers: parse_records(vector, "vector layer"),
            raster_layers: parse_records(raster, "raster layer"),
            street_images: parse_records(images, "street image"),
        }
    }

    /// All records, raster first, then vector, then street images.
    pub fn records(&self) -> Vec<LayerRecord> {
        self.raster_layers
            .iter()
            .cloned()
            .map(LayerRecord::Raster)
            .chain(self.vector_layers.iter().cloned().map(LayerRecord::Vector))
            .chain(self.street_images.iter().cloned().map(LayerRecord::StreetImage))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.vector_layers.is_empty() && self.raster_layers.is_empty() && self.street_images.is_empty()
    }
}

/// Parses a JSON array element by element. Elements that fail to deserialize
/// are logged and dropped; a non-array payload yields no records.
pub fn parse_records<T: DeserializeOwned>(payload: &serde_json::Value, what: &str) -> Vec<T> {
    let Some(items) = payload.as_array() else {
        if !payload.is_null() {
            log::warn!("expected a JSON array of {} records, got {}", what, payload);
        }
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("skipping malformed {} at index {}: {}", what, index, e);
                None
            }
        })
        .collect()
}
