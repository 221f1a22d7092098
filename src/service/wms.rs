//! WMS request parameters and URL builders.
//!
//! Parameter names are case-insensitive on the wire; [`WmsParams`] stores them
//! upper-cased and keeps insertion order so generated URLs are stable.

use serde::{Deserialize, Serialize};

use crate::core::bounds::Bounds;
use crate::core::constants::*;
use crate::core::geo::{Point, ViewState};
use crate::service::url::append_query;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsParams {
    entries: Vec<(String, String)>,
}

impl WmsParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any existing value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let key = key.to_ascii_uppercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_uppercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = key.to_ascii_uppercase();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Applies every entry of `other` on top of these parameters.
    pub fn merge(&mut self, other: &WmsParams) {
        for (key, value) in &other.entries {
            self.set(key, value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn layers(&self) -> Option<&str> {
        self.get("LAYERS")
    }

    pub fn version(&self) -> &str {
        self.get("VERSION").unwrap_or(WMS_VERSION_1_3_0)
    }

    /// 1.3.0 names the reference system `CRS`; earlier versions use `SRS`.
    pub fn uses_crs(&self) -> bool {
        self.version().starts_with("1.3")
    }

    // --- presets ----------------------------------------------------------

    /// Tiled raster request parameters.
    pub fn raster_tiled(layer: &str) -> Self {
        Self::new()
            .with("LAYERS", layer)
            .with("FORMAT", "image/png")
            .with("TRANSPARENT", "true")
            .with("VERSION", WMS_VERSION_1_3_0)
            .with("CRS", WEB_MERCATOR)
            .with("STYLES", "")
            .with("TILED", "true")
    }

    /// Single-image raster request parameters.
    pub fn raster_untiled(layer: &str) -> Self {
        Self::new()
            .with("LAYERS", layer)
            .with("FORMAT", "image/png")
            .with("TRANSPARENT", "true")
            .with("VERSION", WMS_VERSION_1_3_0)
            .with("CRS", WGS84)
            .with("STYLES", "")
    }

    /// Compatibility overrides applied once after a raster load failure.
    pub fn raster_fallback() -> Self {
        Self::new()
            .with("CRS", WEB_MERCATOR)
            .with("VERSION", WMS_VERSION_1_1_1)
            .with("SRS", WEB_MERCATOR)
            .with("FORMAT", "image/jpeg")
            .with("BGCOLOR", "0xFFFFFF")
    }

    pub fn vector_tiled(layer: &str) -> Self {
        Self::new()
            .with("LAYERS", layer)
            .with("TILED", "true")
            .with("FORMAT", "image/png")
            .with("TRANSPARENT", "true")
            .with("VERSION", WMS_VERSION_1_1_1)
            .with("SRS", WEB_MERCATOR)
            .with("STYLES", "")
            .with("BGCOLOR", "0xFFFFFF")
    }

    /// Overrides applied once after a vector load failure.
    pub fn vector_fallback() -> Self {
        Self::new()
            .with("VERSION", WMS_VERSION_1_1_1)
            .with("SRS", WEB_MERCATOR)
            .with("FORMAT", "image/jpeg")
    }

    /// Backend-rendered overlay of a project's street images.
    pub fn street_overlay(layer: &str) -> Self {
        Self::new()
            .with("LAYERS", layer)
            .with("TILED", "true")
            .with("FORMAT", "image/png")
            .with("TRANSPARENT", "true")
            .with("VERSION", WMS_VERSION_1_1_0)
            .with("SRS", WEB_MERCATOR)
    }
}

/// GetMap request for `bbox` rendered at `width`×`height` pixels.
pub fn get_map_url(service_url: &str, params: &WmsParams, bbox: &Bounds, width: u32, height: u32) -> String {
    let mut request = WmsParams::new()
        .with("SERVICE", "WMS")
        .with("REQUEST", "GetMap");
    request.merge(params);
    request.set("BBOX", bbox.to_bbox_param());
    request.set("WIDTH", width.to_string());
    request.set("HEIGHT", height.to_string());
    append_query(service_url, request.iter())
}

/// What to ask a layer for at a clicked point.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfoRequest<'a> {
    pub coordinate: Point,
    pub view: &'a ViewState,
    pub info_format: &'a str,
    pub feature_count: u32,
    /// Ask for UTF-8 output explicitly (vector layers).
    pub utf8: bool,
}

/// GetFeatureInfo request for the layer described by `params`.
///
/// The request covers a [`FEATURE_INFO_WINDOW_PX`]-pixel square centred on
/// the click at the view's resolution, in the view's projection.
pub fn get_feature_info_url(service_url: &str, params: &WmsParams, request: &FeatureInfoRequest<'_>) -> String {
    let window = FEATURE_INFO_WINDOW_PX;
    let extent = window as f64 * request.view.resolution;
    let bbox = Bounds::from_center_and_size(request.coordinate, extent, extent);
    let center = (window / 2).to_string();

    let mut query = WmsParams::new()
        .with("SERVICE", "WMS")
        .with("REQUEST", "GetFeatureInfo");
    query.merge(params);
    // Reference system follows the view, not the layer's own request.
    query.remove("CRS");
    query.remove("SRS");
    query.remove("TILED");
    let layers = params.layers().unwrap_or_default().to_string();
    query.set("QUERY_LAYERS", layers);
    query.set("INFO_FORMAT", request.info_format);
    query.set("FEATURE_COUNT", request.feature_count.to_string());
    if request.utf8 {
        query.set("FORMAT_OPTIONS", "charset:UTF-8");
    }
    query.set("BBOX", bbox.to_bbox_param());
    query.set("WIDTH", window.to_string());
    query.set("HEIGHT", window.to_string());
    if params.uses_crs() {
        query.set("CRS", request.view.projection.clone());
        query.set("I", center.clone());
        query.set("J", center);
    } else {
        query.set("SRS", request.view.projection.clone());
        query.set("X", center.clone());
        query.set("Y", center);
    }

    append_query(service_url, query.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_of(url: &str) -> Vec<(String, String)> {
        let (_, query) = url.split_once('?').unwrap();
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_set_is_case_insensitive() {
        let mut params = WmsParams::raster_tiled("ws:a");
        params.set("layers", "ws:b");
        assert_eq!(params.layers(), Some("ws:b"));
        assert_eq!(params.iter().filter(|(k, _)| *k == "LAYERS").count(), 1);
    }

    #[test]
    fn test_raster_fallback_merge() {
        let mut params = WmsParams::raster_tiled("ws:a");
        params.merge(&WmsParams::raster_fallback());
        assert_eq!(params.version(), "1.1.1");
        assert_eq!(params.get("FORMAT"), Some("image/jpeg"));
        assert_eq!(params.get("SRS"), Some("EPSG:3857"));
        assert_eq!(params.get("BGCOLOR"), Some("0xFFFFFF"));
        assert_eq!(params.get("TILED"), Some("true"));
        assert!(!params.uses_crs());
    }

    #[test]
    fn test_get_map_url() {
        let url = get_map_url(
            "/geoserver/ws/wms",
            &WmsParams::raster_untiled("ws:dem"),
            &Bounds::from_coords(72.0, 18.0, 73.0, 19.0),
            512,
            256,
        );
        let pairs = query_of(&url);
        assert_eq!(param(&pairs, "REQUEST"), Some("GetMap"));
        assert_eq!(param(&pairs, "CRS"), Some("EPSG:4326"));
        assert_eq!(param(&pairs, "BBOX"), Some("72,18,73,19"));
        assert_eq!(param(&pairs, "WIDTH"), Some("512"));
    }

    #[test]
    fn test_feature_info_1_3_0_uses_i_j() {
        let view = ViewState::new(2.0);
        let request = FeatureInfoRequest {
            coordinate: Point::new(1000.0, 2000.0),
            view: &view,
            info_format: "application/json",
            feature_count: 50,
            utf8: false,
        };
        let url = get_feature_info_url("/wms", &WmsParams::raster_untiled("ws:dem"), &request);
        let pairs = query_of(&url);

        assert_eq!(param(&pairs, "REQUEST"), Some("GetFeatureInfo"));
        assert_eq!(param(&pairs, "QUERY_LAYERS"), Some("ws:dem"));
        assert_eq!(param(&pairs, "CRS"), Some("EPSG:3857"));
        assert_eq!(param(&pairs, "I"), Some("50"));
        assert_eq!(param(&pairs, "J"), Some("50"));
        assert_eq!(param(&pairs, "BBOX"), Some("899,1899,1101,2101"));
        assert_eq!(param(&pairs, "FEATURE_COUNT"), Some("50"));
        assert_eq!(param(&pairs, "X"), None);
    }

    #[test]
    fn test_feature_info_1_1_1_uses_x_y() {
        let view = ViewState::new(1.0);
        let request = FeatureInfoRequest {
            coordinate: Point::new(0.0, 0.0),
            view: &view,
            info_format: "application/json",
            feature_count: 50,
            utf8: true,
        };
        let url = get_feature_info_url("/wms", &WmsParams::vector_tiled("ws:roads"), &request);
        let pairs = query_of(&url);

        assert_eq!(param(&pairs, "SRS"), Some("EPSG:3857"));
        assert_eq!(param(&pairs, "X"), Some("50"));
        assert_eq!(param(&pairs, "Y"), Some("50"));
        assert_eq!(param(&pairs, "FORMAT_OPTIONS"), Some("charset:UTF-8"));
        assert_eq!(param(&pairs, "TILED"), None);
        assert_eq!(param(&pairs, "CRS"), None);
    }
}
