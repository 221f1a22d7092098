use serde::{Deserialize, Serialize};

use crate::core::constants::{Z_INDEX_BASE, Z_INDEX_RASTER, Z_INDEX_STREET, Z_INDEX_VECTOR};

/// The four kinds of layer the engine manages. Every kind-dependent decision
/// is an exhaustive match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Vector,
    Raster,
    StreetImage,
    Base,
}

impl LayerKind {
    /// Visibility used when neither a permanent nor a temporary value is set.
    /// Base layers are handled separately: exactly one of them is shown.
    pub fn default_visibility(&self) -> bool {
        match self {
            LayerKind::Vector => true,
            LayerKind::Raster | LayerKind::StreetImage | LayerKind::Base => false,
        }
    }

    /// Position in click-query order: raster, then vector, then street images.
    /// Base layers are never queried.
    pub fn query_rank(&self) -> Option<u8> {
        match self {
            LayerKind::Raster => Some(0),
            LayerKind::Vector => Some(1),
            LayerKind::StreetImage => Some(2),
            LayerKind::Base => None,
        }
    }

    /// First z-index of this kind's band.
    pub fn z_index_band(&self) -> i32 {
        match self {
            LayerKind::Base => Z_INDEX_BASE,
            LayerKind::Raster => Z_INDEX_RASTER,
            LayerKind::Vector => Z_INDEX_VECTOR,
            LayerKind::StreetImage => Z_INDEX_STREET,
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Vector => write!(f, "vector"),
            LayerKind::Raster => write!(f, "raster"),
            LayerKind::StreetImage => write!(f, "street_image"),
            LayerKind::Base => write!(f, "base"),
        }
    }
}

/// Load state of a layer handle.
///
/// `Pending -> Loading -> {Loaded | Retrying} -> {Loaded | Error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingStatus {
    Pending,
    Loading,
    Loaded,
    Retrying,
    Error,
}

impl LoadingStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadingStatus::Loaded | LoadingStatus::Error)
    }
}

impl std::fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadingStatus::Pending => write!(f, "pending"),
            LoadingStatus::Loading => write!(f, "loading"),
            LoadingStatus::Loaded => write!(f, "loaded"),
            LoadingStatus::Retrying => write!(f, "retrying"),
            LoadingStatus::Error => write!(f, "error"),
        }
    }
}

/// Identity and presentation properties shared by every layer handle.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProperties {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    pub z_index: i32,
    pub opacity: f32,
    pub visible: bool,
}

impl LayerProperties {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            z_index: kind.z_index_band(),
            opacity: 1.0,
            visible: kind.default_visibility(),
        }
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}
