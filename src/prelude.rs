//! Prelude module for common layerkit types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use layerkit::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{
        EngineOptions, EngineProfile, HttpConfig, PreloadConfig, ProxyConfig, ProxyRule,
        QueryConfig, RasterConfig, ThumbnailConfig,
    },
    geo::{LatLng, Point, ViewState},
};

pub use crate::data::{
    geojson::{GeoJson, GeoJsonFeature, GeoJsonGeometry},
    records::{ImageRecord, LayerRecord, ProjectLayerSet, RasterRecord, VectorRecord},
};

pub use crate::engine::{Engine, EngineBuilder, EngineCacheStats, LayerLoadEvent, LoadMetrics};

pub use crate::layers::{
    base::{LayerKind, LoadingStatus},
    factory::LayerFactory,
    handle::{LayerHandle, LayerSource},
    lifecycle::{LoadEvent, LoadLifecycle},
    registry::LayerRegistry,
    street::{PointStyle, StreetStyler},
    visibility::VisibilityStore,
};

pub use crate::query::dispatcher::{FeatureQueryDispatcher, QueryResult};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::service::{
    capabilities::CapabilityCache,
    catalog::{HttpProjectCatalog, ProjectCatalog},
    fetcher::{FetchResponse, HttpFetcher, ReqwestFetcher},
    resolver::{LayerNameResolver, ValidationResult},
    url::ServiceUrlResolver,
    wms::WmsParams,
};

pub use crate::spatial::index::{SpatialIndex, SpatialItem};

pub use crate::thumbnail::{
    cache::{ThumbnailCache, ThumbnailStats},
    preload::PreloadScheduler,
    FailureKind, ThumbnailRef, ThumbnailState,
};

pub use crate::traits::{CacheStats, Cacheable, Configurable};

pub use crate::{Error as EngineError, Result};

pub use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
