//! Core constants for service protocols, thumbnails and layer policy.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Web Mercator, the view projection for every tiled request.
pub const WEB_MERCATOR: &str = "EPSG:3857";

/// Geographic WGS84, used by untiled raster requests.
pub const WGS84: &str = "EPSG:4326";

/// Protocol version used for capability discovery and modern GetMap requests.
pub const WMS_VERSION_1_3_0: &str = "1.3.0";

/// Compatibility protocol version used by vector layers and fallbacks.
pub const WMS_VERSION_1_1_1: &str = "1.1.1";

/// Version the street-image overlay is requested with.
pub const WMS_VERSION_1_1_0: &str = "1.1.0";

/// Rasters wider or taller than this (in pixels) are served tiled.
pub const RASTER_TILING_THRESHOLD: u32 = 5000;

/// Client-side tile cache size requested for tiled rasters.
pub const RASTER_TILE_CACHE_SIZE: usize = 2048;

/// Untiled image requests cover this multiple of the viewport.
pub const UNTILED_IMAGE_RATIO: f64 = 1.5;

/// Automatic fallback reconfigurations allowed per layer.
pub const LOAD_RETRY_BUDGET: u32 = 1;

/// Ordered, case-insensitive tokens tried when no requested name matches.
pub const LAYER_NAME_PATTERNS: &[&str] = &["raster", "tif", "img", "world", "map", "ne1", "hr", "lc"];

/// Thumbnail canvas edge in pixels.
pub const THUMBNAIL_SIZE: u32 = 60;

/// Deadline for a single thumbnail fetch.
pub const THUMBNAIL_TIMEOUT_SECS: u64 = 10;

/// JPEG quality (1-100) for encoded thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Fallback icon edge in pixels.
pub const FALLBACK_ICON_SIZE: u32 = 50;

/// Thumbnails fetched concurrently per preload batch.
pub const PRELOAD_BATCH_SIZE: usize = 3;

/// Pause between preload batches.
pub const PRELOAD_BATCH_DELAY_MS: u64 = 500;

/// Deadline for a feature-info request against one layer.
pub const QUERY_TIMEOUT_SECS: u64 = 5;

/// Maximum features requested per feature-info call.
pub const QUERY_FEATURE_COUNT: u32 = 50;

/// Feature-info responses are requested as GeoJSON.
pub const QUERY_INFO_FORMAT: &str = "application/json";

/// Square pixel window a feature-info request is centred in.
pub const FEATURE_INFO_WINDOW_PX: u32 = 101;

/// Local hit-test radius in screen pixels.
pub const HIT_TOLERANCE_PX: f64 = 8.0;

/// Street images closer than this (radians, flat approximation) are connected.
pub const CONNECTION_THRESHOLD_RAD: f64 = 0.001;

/// Coordinates with both magnitudes at or below this are treated as unset.
pub const MIN_COORDINATE_MAGNITUDE: f64 = 0.001;

/// Opacity of the backend-rendered street-image overlay.
pub const STREET_OVERLAY_OPACITY: f32 = 0.7;

/// Z-index bands per layer kind.
pub const Z_INDEX_BASE: i32 = 0;
pub const Z_INDEX_RASTER: i32 = 100;
pub const Z_INDEX_VECTOR: i32 = 200;
pub const Z_INDEX_STREET: i32 = 300;

/// Base layer visible when nothing else was chosen.
pub const DEFAULT_BASE_LAYER: &str = "satellite";

/// Base layer ids; exactly one of these is visible at a time.
pub const BASE_LAYER_IDS: &[&str] = &["osm", "satellite", "terrain"];

pub const USER_AGENT: &str = "layerkit/0.1.0";
