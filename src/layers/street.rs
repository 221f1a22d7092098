//! Street-image layers: one point per geo-tagged image, an optional
//! backend-rendered overlay, and lines joining images taken close together.

use std::collections::HashMap as StdHashMap;

use serde::{Deserialize, Serialize};

use crate::core::constants::CONNECTION_THRESHOLD_RAD;
use crate::core::geo::{LatLng, Point};
use crate::data::geojson::{GeoJsonFeature, GeoJsonGeometry};
use crate::data::records::ImageRecord;
use crate::layers::base::LayerKind;
use crate::runtime;
use crate::service::url::{split_layers_param, ServiceUrlResolver};
use crate::spatial::index::{FeatureIndex, Shape};
use crate::thumbnail::cache::ThumbnailCache;
use crate::thumbnail::ThumbnailState;

const LABEL_MAX_CHARS: usize = 20;
const LABEL_RESOLUTION: f64 = 30.0;

pub fn street_images_id(project_id: &str) -> String {
    format!("street_images_{}", project_id)
}

pub fn street_overlay_id(project_id: &str) -> String {
    format!("street_images_wms_{}", project_id)
}

pub fn street_connections_id(project_id: &str) -> String {
    format!("street_connections_{}", project_id)
}

/// Ids of the three street layers of a project: images, overlay, connections.
pub fn street_layer_ids(project_id: &str) -> [String; 3] {
    [
        street_images_id(project_id),
        street_overlay_id(project_id),
        street_connections_id(project_id),
    ]
}

/// A georeferenced street image ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetFeature {
    pub image_id: String,
    pub name: String,
    pub position: LatLng,
    /// Position in EPSG:3857.
    pub point: Point,
    /// Source image URL as recorded; the thumbnail cache proxies it.
    pub image_url: Option<String>,
    /// Proxy-safe image URL for viewers.
    pub proxied_url: Option<String>,
    pub image_type: String,
    pub processing_status: Option<String>,
    pub captured_at: Option<String>,
}

impl StreetFeature {
    /// `None` for images without a usable position.
    pub fn from_record(record: &ImageRecord, urls: &ServiceUrlResolver) -> Option<Self> {
        let position = record.position()?;
        let image_url = record.image_url().map(str::to_string);
        Some(Self {
            image_id: record.id.clone(),
            name: record.name().to_string(),
            position,
            point: position.to_mercator(),
            proxied_url: image_url.as_deref().map(|url| urls.to_proxy_url(url)),
            image_url,
            image_type: record
                .image_type
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "front_view".to_string()),
            processing_status: record.processing_status.clone(),
            captured_at: record.captured_at.clone(),
        })
    }

    pub fn to_geojson(&self) -> GeoJsonFeature {
        let mut properties = StdHashMap::new();
        properties.insert("name".to_string(), self.name.clone().into());
        properties.insert("image_type".to_string(), self.image_type.clone().into());
        properties.insert("kind".to_string(), LayerKind::StreetImage.to_string().into());
        if let Some(url) = &self.proxied_url {
            properties.insert("image_url".to_string(), url.clone().into());
        }
        if let Some(status) = &self.processing_status {
            properties.insert("processing_status".to_string(), status.clone().into());
        }
        if let Some(captured_at) = &self.captured_at {
            properties.insert("captured_at".to_string(), captured_at.clone().into());
        }
        GeoJsonFeature::new(self.image_id.clone(), GeoJsonGeometry::point(self.position), properties)
    }
}

/// Two images taken close enough together to be joined by a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from_id: String,
    pub to_id: String,
    pub from: LatLng,
    pub to: LatLng,
    /// Flat angular separation in radians.
    pub separation: f64,
}

impl Connection {
    pub fn to_geojson(&self, index: usize) -> GeoJsonFeature {
        let mut properties = StdHashMap::new();
        properties.insert("from_image".to_string(), self.from_id.clone().into());
        properties.insert("to_image".to_string(), self.to_id.clone().into());
        properties.insert("separation".to_string(), self.separation.into());
        GeoJsonFeature::new(
            format!("connection_{}", index),
            GeoJsonGeometry::line(self.from, self.to),
            properties,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStyle {
    pub color: String,
    pub width: f64,
    pub line_dash: [f64; 2],
}

impl Default for ConnectionStyle {
    fn default() -> Self {
        Self {
            color: "rgba(0, 123, 255, 0.5)".to_string(),
            width: 2.0,
            line_dash: [5.0, 5.0],
        }
    }
}

/// Every pair `(i, j)`, `i < j`, whose separation is under the threshold.
pub fn build_connections(features: &[StreetFeature]) -> Vec<Connection> {
    let mut connections = Vec::new();
    for (i, a) in features.iter().enumerate() {
        for b in &features[i + 1..] {
            let separation = a.position.angular_separation(&b.position);
            if separation < CONNECTION_THRESHOLD_RAD {
                connections.push(Connection {
                    from_id: a.image_id.clone(),
                    to_id: b.image_id.clone(),
                    from: a.position,
                    to: b.position,
                    separation,
                });
            }
        }
    }
    connections
}

/// Everything the factory needs to build a project's street layers.
#[derive(Debug, Clone, Default)]
pub struct StreetLayerData {
    pub features: Vec<StreetFeature>,
    pub connections: Vec<Connection>,
    /// Proxied overlay endpoint and its `LAYERS` value.
    pub overlay: Option<(String, String)>,
    pub skipped: usize,
}

impl StreetLayerData {
    pub fn from_images(images: &[ImageRecord], urls: &ServiceUrlResolver) -> Self {
        let features: Vec<StreetFeature> = images
            .iter()
            .filter_map(|image| StreetFeature::from_record(image, urls))
            .collect();
        let skipped = images.len() - features.len();
        if skipped > 0 {
            log::debug!("skipping {} street images without usable coordinates", skipped);
        }

        Self {
            connections: build_connections(&features),
            overlay: overlay_source(images, urls),
            features,
            skipped,
        }
    }

    pub fn point_index(&self) -> FeatureIndex {
        FeatureIndex::new(
            self.features
                .iter()
                .map(|feature| (Shape::Point(feature.point), feature.to_geojson()))
                .collect(),
        )
    }

    pub fn connection_index(&self) -> FeatureIndex {
        FeatureIndex::new(
            self.connections
                .iter()
                .enumerate()
                .map(|(i, connection)| {
                    let shape = Shape::Segment(connection.from.to_mercator(), connection.to.to_mercator());
                    (shape, connection.to_geojson(i))
                })
                .collect(),
        )
    }
}

/// Overlay endpoint from the first image that names one.
fn overlay_source(images: &[ImageRecord], urls: &ServiceUrlResolver) -> Option<(String, String)> {
    let layer_url = images
        .iter()
        .filter_map(|image| image.geoserver_layer_url.as_deref())
        .find(|url| !url.trim().is_empty())?;
    let (base, layers) = split_layers_param(layer_url);
    match layers {
        Some(layers) => Some((urls.to_proxy_url(&base), layers)),
        None => {
            log::debug!("street overlay URL {} has no layers parameter", layer_url);
            None
        }
    }
}

/// Marker colour for an image type.
pub fn type_color(image_type: &str) -> &'static str {
    match image_type {
        "front_view" => "#007bff",
        "side_view" => "#28a745",
        "back_view" => "#ffc107",
        "rear_view" => "#fd7e14",
        "aerial_view" => "#dc3545",
        "panoramic" => "#6f42c1",
        _ => "#007bff",
    }
}

/// Processing state overrides the type colour.
pub fn feature_color(feature: &StreetFeature) -> &'static str {
    match feature.processing_status.as_deref() {
        Some("processing") => "#6c757d",
        Some("failed") => "#dc3545",
        _ => type_color(&feature.image_type),
    }
}

pub fn type_glyph(image_type: &str) -> &'static str {
    match image_type {
        "side_view" => "📸",
        "back_view" => "📹",
        "aerial_view" => "🚁",
        "panoramic" => "🌐",
        _ => "📷",
    }
}

/// Marker scale for a view resolution in map units per pixel.
pub fn scale_for_resolution(resolution: f64) -> f64 {
    if resolution > 200.0 {
        0.7
    } else if resolution > 50.0 {
        1.0
    } else if resolution > 10.0 {
        1.2
    } else {
        1.4
    }
}

fn truncate_label(name: &str) -> String {
    if name.chars().count() > LABEL_MAX_CHARS {
        let head: String = name.chars().take(LABEL_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLabel {
    pub text: String,
    pub offset_y: f64,
}

/// How one street-image point should be drawn right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointStyle {
    Thumbnail {
        data_url: String,
        scale: f64,
        label: Option<PointLabel>,
    },
    Loading {
        radius: f64,
        fill: String,
        stroke: String,
        stroke_width: f64,
        line_dash: [f64; 2],
        glyph: String,
        font_size: f64,
    },
    Fallback {
        radius: f64,
        fill: String,
        stroke: String,
        stroke_width: f64,
        glyph: String,
        font_size: f64,
    },
}

/// Computes point styles on demand, starting thumbnail loads as a side effect.
#[derive(Debug, Clone)]
pub struct StreetStyler {
    thumbnails: ThumbnailCache,
}

impl StreetStyler {
    pub fn new(thumbnails: ThumbnailCache) -> Self {
        Self { thumbnails }
    }

    /// Never blocks: a missing thumbnail is requested in the background and
    /// the type glyph is drawn until it lands.
    pub fn style_for(&self, feature: &StreetFeature, resolution: f64) -> PointStyle {
        let scale = scale_for_resolution(resolution);
        let color = feature_color(feature);

        match self.thumbnails.peek(&feature.image_id) {
            ThumbnailState::Ready(thumbnail) => PointStyle::Thumbnail {
                data_url: thumbnail.data_url().to_string(),
                scale,
                label: (resolution < LABEL_RESOLUTION).then(|| PointLabel {
                    text: truncate_label(&feature.name),
                    offset_y: 35.0 * scale,
                }),
            },
            ThumbnailState::Pending => PointStyle::Loading {
                radius: 20.0 * scale,
                fill: "rgba(255, 255, 255, 0.9)".to_string(),
                stroke: color.to_string(),
                stroke_width: 3.0,
                line_dash: [4.0, 4.0],
                glyph: "↻".to_string(),
                font_size: 18.0 * scale,
            },
            ThumbnailState::Missing => {
                if let Some(url) = &feature.image_url {
                    if !self.thumbnails.has_failed(url) {
                        self.request(&feature.image_id, url);
                    }
                }
                PointStyle::Fallback {
                    radius: 25.0 * scale,
                    fill: "rgba(255, 255, 255, 0.95)".to_string(),
                    stroke: color.to_string(),
                    stroke_width: 3.0,
                    glyph: type_glyph(&feature.image_type).to_string(),
                    font_size: 20.0 * scale,
                }
            }
        }
    }

    fn request(&self, image_id: &str, url: &str) {
        let cache = self.thumbnails.clone();
        let image_id = image_id.to_string();
        let url = url.to_string();
        runtime::spawn(async move {
            cache.resolve(&image_id, &url).await;
        });
    }
}
