//! Live layer handles shared between the engine and the render collaborator.

use std::sync::MutexGuard;

use serde::{Deserialize, Serialize};

use super::base::{LayerKind, LayerProperties, LoadingStatus};
use super::lifecycle::{LoadEvent, LoadLifecycle, Transition};
use super::street::{Connection, ConnectionStyle, StreetFeature};
use crate::prelude::{Arc, Duration, Instant, Mutex};
use crate::service::wms::WmsParams;
use crate::spatial::index::FeatureIndex;

/// What a handle draws from. One variant per representation.
#[derive(Debug, Clone)]
pub enum LayerSource {
    /// Tiled WMS requests.
    TiledWms {
        url: String,
        params: WmsParams,
        tile_cache_size: usize,
    },
    /// Single-image WMS requests covering `ratio` × the viewport.
    ImageWms {
        url: String,
        params: WmsParams,
        ratio: f64,
    },
    /// Features streamed directly from the service as GeoJSON.
    FeatureStream { url: String, type_name: String },
    /// Street-image points held in memory.
    PointFeatures {
        features: Arc<Vec<StreetFeature>>,
        index: Arc<FeatureIndex>,
    },
    /// Lines between nearby street images.
    Connections {
        connections: Arc<Vec<Connection>>,
        index: Arc<FeatureIndex>,
        style: ConnectionStyle,
    },
    /// XYZ tile template of a base layer.
    Xyz { url_template: String },
}

impl LayerSource {
    pub fn url(&self) -> Option<&str> {
        match self {
            LayerSource::TiledWms { url, .. }
            | LayerSource::ImageWms { url, .. }
            | LayerSource::FeatureStream { url, .. } => Some(url),
            LayerSource::Xyz { url_template } => Some(url_template),
            LayerSource::PointFeatures { .. } | LayerSource::Connections { .. } => None,
        }
    }

    /// Request parameters of backend-rendered sources.
    pub fn params(&self) -> Option<&WmsParams> {
        match self {
            LayerSource::TiledWms { params, .. } | LayerSource::ImageWms { params, .. } => Some(params),
            _ => None,
        }
    }

    fn params_mut(&mut self) -> Option<&mut WmsParams> {
        match self {
            LayerSource::TiledWms { params, .. } | LayerSource::ImageWms { params, .. } => Some(params),
            _ => None,
        }
    }

    /// Features held locally and hit-tested in memory.
    pub fn local_index(&self) -> Option<&Arc<FeatureIndex>> {
        match self {
            LayerSource::PointFeatures { index, .. } | LayerSource::Connections { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self, LayerSource::TiledWms { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayerSource::TiledWms { .. } => "tiled_wms",
            LayerSource::ImageWms { .. } => "image_wms",
            LayerSource::FeatureStream { .. } => "feature_stream",
            LayerSource::PointFeatures { .. } => "point_features",
            LayerSource::Connections { .. } => "connections",
            LayerSource::Xyz { .. } => "xyz",
        }
    }
}

#[derive(Debug)]
struct HandleState {
    properties: LayerProperties,
    source: LayerSource,
    lifecycle: LoadLifecycle,
    /// Parameters merged in once after the first load failure.
    fallback: Option<WmsParams>,
    diagnostic: Option<String>,
    /// Bumped on every source change so the renderer knows to refresh.
    revision: u64,
}

/// Serializable view of a handle for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    pub source: String,
    pub z_index: i32,
    pub opacity: f32,
    pub visible: bool,
    pub status: LoadingStatus,
    pub layer_name: Option<String>,
    pub load_time_ms: Option<u64>,
    /// Broken-layer message, set only once loading failed for good.
    pub diagnostic: Option<String>,
    pub revision: u64,
}

/// A renderable layer. Clones share state; every update happens in place.
#[derive(Debug, Clone)]
pub struct LayerHandle {
    id: Arc<str>,
    kind: LayerKind,
    state: Arc<Mutex<HandleState>>,
}

impl LayerHandle {
    pub fn new(properties: LayerProperties, source: LayerSource) -> Self {
        Self {
            id: Arc::from(properties.id.as_str()),
            kind: properties.kind,
            state: Arc::new(Mutex::new(HandleState {
                properties,
                source,
                // Without fallback parameters a retry would repeat the same request.
                lifecycle: LoadLifecycle::with_retry_budget(0),
                fallback: None,
                diagnostic: None,
                revision: 0,
            })),
        }
    }

    /// Parameters merged into the source after its first failed load,
    /// which also grants the layer its one retry.
    pub fn with_fallback(self, fallback: WmsParams) -> Self {
        {
            let mut state = self.lock();
            state.fallback = Some(fallback);
            state.lifecycle = LoadLifecycle::new();
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn name(&self) -> String {
        self.lock().properties.name.clone()
    }

    pub fn z_index(&self) -> i32 {
        self.lock().properties.z_index
    }

    pub fn opacity(&self) -> f32 {
        self.lock().properties.opacity
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.lock().properties.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn is_visible(&self) -> bool {
        self.lock().properties.visible
    }

    pub fn set_visible(&self, visible: bool) {
        self.lock().properties.visible = visible;
    }

    pub fn source(&self) -> LayerSource {
        self.lock().source.clone()
    }

    /// Runs `f` against the source without cloning it.
    pub fn with_source<R>(&self, f: impl FnOnce(&LayerSource) -> R) -> R {
        f(&self.lock().source)
    }

    pub fn params(&self) -> Option<WmsParams> {
        self.lock().source.params().cloned()
    }

    /// The `LAYERS` value the handle currently requests.
    pub fn layer_name(&self) -> Option<String> {
        self.lock()
            .source
            .params()
            .and_then(|params| params.layers())
            .map(str::to_string)
    }

    /// Points the handle at another service layer. Returns whether anything changed.
    pub fn set_layer_name(&self, layer_name: &str) -> bool {
        let mut state = self.lock();
        let Some(params) = state.source.params_mut() else {
            return false;
        };
        if params.layers() == Some(layer_name) {
            return false;
        }
        params.set("LAYERS", layer_name);
        state.revision += 1;
        true
    }

    /// Merges `update` into the request parameters.
    pub fn update_params(&self, update: &WmsParams) -> bool {
        let mut state = self.lock();
        let Some(params) = state.source.params_mut() else {
            return false;
        };
        params.merge(update);
        state.revision += 1;
        true
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Feeds one load event through the handle's lifecycle and applies the
    /// fallback parameters when the lifecycle asks for them.
    pub fn handle_load_event(&self, event: LoadEvent, at: Instant) -> Transition {
        let mut state = self.lock();
        let transition = state.lifecycle.on_event(event, at);
        if transition.apply_fallback {
            if let Some(fallback) = state.fallback.clone() {
                if let Some(params) = state.source.params_mut() {
                    params.merge(&fallback);
                    state.revision += 1;
                }
            }
            log::info!("layer {} failed to load; retrying with fallback parameters", self.id);
        } else if transition.status == LoadingStatus::Error && event == LoadEvent::Failed {
            log::warn!("layer {} failed to load", self.id);
        }
        transition
    }

    pub fn status(&self) -> LoadingStatus {
        self.lock().lifecycle.status()
    }

    pub fn load_time(&self) -> Option<Duration> {
        self.lock().lifecycle.last_load_time()
    }

    pub fn set_diagnostic(&self, diagnostic: Option<String>) {
        self.lock().diagnostic = diagnostic;
    }

    /// The stored diagnostic, reported only while the handle is in `Error`.
    pub fn diagnostic(&self) -> Option<String> {
        let state = self.lock();
        match state.lifecycle.status() {
            LoadingStatus::Error => state
                .diagnostic
                .clone()
                .or_else(|| Some(format!("Layer '{}' failed to load", state.properties.name))),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        let state = self.lock();
        let status = state.lifecycle.status();
        LayerSnapshot {
            id: state.properties.id.clone(),
            name: state.properties.name.clone(),
            kind: state.properties.kind,
            source: state.source.name().to_string(),
            z_index: state.properties.z_index,
            opacity: state.properties.opacity,
            visible: state.properties.visible,
            status,
            layer_name: state.source.params().and_then(|p| p.layers()).map(str::to_string),
            load_time_ms: state.lifecycle.last_load_time().map(|d| d.as_millis() as u64),
            diagnostic: match status {
                LoadingStatus::Error => state.diagnostic.clone(),
                _ => None,
            },
            revision: state.revision,
        }
    }
}
