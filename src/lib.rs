//! # layerkit
//!
//! Layer resolution and caching engine for project maps backed by a WMS-style
//! tile/feature service.
//!
//! The crate turns project layer records (vector, raster, geo-tagged street
//! images) into live, correctly named, visibility-aware layer handles. It
//! caches service capabilities and layer-name corrections, synthesizes
//! thumbnails with bounded-concurrency preloading, drives a per-layer load
//! lifecycle with a single fallback retry, and aggregates click queries across
//! heterogeneous layers.
//!
//! Rendering itself is left to a collaborator: layer handles expose the
//! parameters a map toolkit needs and accept visibility/opacity/parameter
//! updates in place.

pub mod core;
pub mod data;
pub mod engine;
pub mod layers;
pub mod prelude;
pub mod query;
pub mod runtime;
pub mod service;
pub mod spatial;
pub mod thumbnail;
pub mod traits;
pub use crate::core::constants;

use std::time::Duration;

// Re-export public API
pub use core::{
    bounds::Bounds,
    config::{EngineOptions, EngineProfile},
    geo::{LatLng, Point, ViewState},
};

pub use data::records::{ImageRecord, LayerRecord, ProjectLayerSet, RasterRecord, VectorRecord};

pub use engine::{Engine, EngineBuilder};

pub use layers::{
    base::{LayerKind, LoadingStatus},
    handle::LayerHandle,
    visibility::VisibilityStore,
};

pub use query::dispatcher::{FeatureQueryDispatcher, QueryResult};

pub use service::{
    capabilities::CapabilityCache,
    fetcher::{HttpFetcher, ReqwestFetcher},
    resolver::{LayerNameResolver, ValidationResult},
    url::ServiceUrlResolver,
};

pub use thumbnail::{cache::ThumbnailCache, preload::PreloadScheduler, ThumbnailRef};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, EngineError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = EngineError;

/// Initializes `env_logger` once. A no-op without the `debug` feature.
pub fn init_logging() {
    #[cfg(feature = "debug")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(cfg!(test))
            .try_init();
    }
}
