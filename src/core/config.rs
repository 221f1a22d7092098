//! Configuration system for engine limits and service plumbing
//!
//! This module provides a hierarchical configuration system that allows users
//! to configure timeouts, batch sizes and proxy rules through presets or
//! custom configurations. Profiles differ only in limits, never in semantics.

use crate::core::constants::*;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineProfile {
    Balanced,
    LowResource,
    Testing,
    Custom(EngineOptions),
}

impl EngineProfile {
    pub fn resolve(&self) -> EngineOptions {
        match self {
            Self::Balanced => EngineOptions::default(),
            Self::LowResource => EngineOptions {
                preload: PreloadConfig {
                    batch_size: 2,
                    batch_delay: Duration::from_millis(1000),
                },
                raster: RasterConfig {
                    tile_cache_size: 512,
                    ..RasterConfig::default()
                },
                http: HttpConfig {
                    pool_max_idle_per_host: 2,
                    ..HttpConfig::default()
                },
                ..EngineOptions::default()
            },
            Self::Testing => EngineOptions {
                thumbnail: ThumbnailConfig {
                    fetch_timeout: Duration::from_secs(1),
                    ..ThumbnailConfig::default()
                },
                preload: PreloadConfig {
                    batch_size: PRELOAD_BATCH_SIZE,
                    batch_delay: Duration::from_millis(10),
                },
                query: QueryConfig {
                    timeout: Duration::from_secs(1),
                    ..QueryConfig::default()
                },
                ..EngineOptions::default()
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub thumbnail: ThumbnailConfig,
    pub preload: PreloadConfig,
    pub query: QueryConfig,
    pub raster: RasterConfig,
    pub proxy: ProxyConfig,
    pub http: HttpConfig,
    /// Build vector layers as direct feature streams instead of tiled images.
    /// Off until the backend serves feature requests cross-origin.
    pub vector_feature_stream: bool,
    /// Root of the project metadata API, e.g. `https://host` for `https://host/api/projects/..`.
    pub api_base: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            thumbnail: ThumbnailConfig::default(),
            preload: PreloadConfig::default(),
            query: QueryConfig::default(),
            raster: RasterConfig::default(),
            proxy: ProxyConfig::default(),
            http: HttpConfig::default(),
            vector_feature_stream: false,
            api_base: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailConfig {
    pub size_px: u32,
    pub fetch_timeout: Duration,
    pub jpeg_quality: u8,
    pub border_color: [u8; 3],
    pub status_color: [u8; 3],
    /// Retry a failed proxied fetch once against the original URL.
    pub retry_unproxied: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size_px: THUMBNAIL_SIZE,
            fetch_timeout: Duration::from_secs(THUMBNAIL_TIMEOUT_SECS),
            jpeg_quality: THUMBNAIL_JPEG_QUALITY,
            border_color: [0x00, 0x7b, 0xff],
            status_color: [0x28, 0xa7, 0x45],
            retry_unproxied: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreloadConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            batch_size: PRELOAD_BATCH_SIZE,
            batch_delay: Duration::from_millis(PRELOAD_BATCH_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub timeout: Duration,
    pub feature_count: u32,
    pub info_format: String,
    pub hit_tolerance_px: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(QUERY_TIMEOUT_SECS),
            feature_count: QUERY_FEATURE_COUNT,
            info_format: QUERY_INFO_FORMAT.to_string(),
            hit_tolerance_px: HIT_TOLERANCE_PX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterConfig {
    pub tiling_threshold_px: u32,
    pub tile_cache_size: usize,
    pub untiled_ratio: f64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            tiling_threshold_px: RASTER_TILING_THRESHOLD,
            tile_cache_size: RASTER_TILE_CACHE_SIZE,
            untiled_ratio: UNTILED_IMAGE_RATIO,
        }
    }
}

/// Rewrites URLs starting with `backend_prefix` to start with `proxy_prefix`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRule {
    pub backend_prefix: String,
    pub proxy_prefix: String,
}

impl ProxyRule {
    pub fn new(backend_prefix: impl Into<String>, proxy_prefix: impl Into<String>) -> Self {
        Self {
            backend_prefix: backend_prefix.into(),
            proxy_prefix: proxy_prefix.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Tried in order; first match wins.
    pub rules: Vec<ProxyRule>,
    /// Host substrings identifying object storage.
    pub object_store_hosts: Vec<String>,
    pub object_store_proxy_path: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                ProxyRule::new("http://192.168.29.246:8080/geoserver", "/geoserver"),
                ProxyRule::new("http://192.168.29.247:8080", ""),
            ],
            object_store_hosts: vec!["kampas.s3.".to_string(), "amazonaws.com".to_string()],
            object_store_proxy_path: "/s3-proxy".to_string(),
        }
    }
}

impl ProxyConfig {
    /// No rewriting at all; useful when the engine talks to the backend directly.
    pub fn passthrough() -> Self {
        Self {
            rules: Vec::new(),
            object_store_hosts: Vec::new(),
            object_store_proxy_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 8,
        }
    }
}
