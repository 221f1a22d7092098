//! Scripted network for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use layerkit::prelude::*;

/// One scripted reply: served to every request whose URL contains each
/// whitespace-separated part of `pattern`.
#[derive(Clone)]
struct Route {
    pattern: String,
    response: FetchResponse,
    delay: Duration,
}

/// [`HttpFetcher`] that answers from a list of URL-substring routes.
///
/// The first matching route wins; unmatched URLs get a 404. Every request is
/// recorded and the peak number of simultaneous requests is tracked.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, pattern: &str, response: FetchResponse) {
        self.route_delayed(pattern, response, Duration::ZERO);
    }

    pub fn route_delayed(&self, pattern: &str, response: FetchResponse, delay: Duration) {
        self.routes.lock().unwrap().push(Route {
            pattern: pattern.to_string(),
            response,
            delay,
        });
    }

    /// A route that never answers within any deadline used by the engine.
    pub fn hang(&self, pattern: &str) {
        self.route_delayed(pattern, FetchResponse::ok(Vec::new()), Duration::from_secs(3600));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| pattern.split_whitespace().all(|part| url.contains(part)))
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn get(&self, url: &str, _accept: Option<&str>) -> Result<FetchResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        let route = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|route| route.pattern.split_whitespace().all(|part| url.contains(part)))
            .cloned();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match route {
            Some(route) => {
                if !route.delay.is_zero() {
                    tokio::time::sleep(route.delay).await;
                }
                Ok(route.response)
            }
            None => Ok(FetchResponse::with_status(404, "not found")),
        }
    }
}

pub fn capabilities_xml(names: &[&str]) -> String {
    let layers: String = names
        .iter()
        .map(|name| format!("<Layer queryable=\"1\"><Name>{}</Name><Title>{}</Title></Layer>", name, name))
        .collect();
    format!(
        "<?xml version=\"1.0\"?>\
         <WMS_Capabilities version=\"1.3.0\" xmlns=\"http://www.opengis.net/wms\">\
         <Service><Name>WMS</Name></Service>\
         <Capability><Layer><Title>root</Title>{}</Layer></Capability>\
         </WMS_Capabilities>",
        layers
    )
}

/// A small PNG the thumbnail renderer can decode.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(80, 60, image::Rgb([20, 160, 60]));
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut bytes, image::ImageOutputFormat::Png)
        .unwrap();
    bytes.into_inner()
}

pub fn feature_collection(ids: &[&str]) -> String {
    let features: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            serde_json::json!({
                "type": "Feature",
                "id": id,
                "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
                "properties": { "name": id },
            })
        })
        .collect();
    serde_json::json!({ "type": "FeatureCollection", "features": features }).to_string()
}

pub fn street_image(id: u32, lat: f64, lng: f64) -> ImageRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "original_filename": format!("IMG_{:04}.jpg", id),
        "s3_url": format!("http://cdn.test/images/{}.jpg", id),
        "latitude": lat,
        "longitude": lng,
        "image_type": "front_view",
        "processing_status": "completed",
    }))
    .unwrap()
}

pub fn raster_record(id: u32, layer_name: &str, width: u32) -> RasterRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "display_name": format!("Raster {}", id),
        "geoserver_url": "http://192.168.29.247:8080/geoserver/rasters/wms",
        "geoserver_layer_name": layer_name,
        "width": width,
        "height": 1000,
    }))
    .unwrap()
}

pub fn vector_record(id: u32, layer_name: &str) -> VectorRecord {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": layer_name,
        "geoserver_url": "http://192.168.29.247:8080/geoserver/vectors/wms",
    }))
    .unwrap()
}

/// Engine on the testing profile talking to `fetcher`.
pub fn engine(fetcher: Arc<ScriptedFetcher>) -> Engine {
    EngineBuilder::new()
        .with_profile(EngineProfile::Testing)
        .with_fetcher(fetcher)
        .build()
        .unwrap()
}

/// Catalog serving a fixed layer set per project.
pub struct FixedCatalog {
    pub sets: Vec<ProjectLayerSet>,
}

#[async_trait]
impl ProjectCatalog for FixedCatalog {
    async fn fetch_layer_set(&self, project_id: &str) -> ProjectLayerSet {
        self.sets
            .iter()
            .find(|set| set.project_id == project_id)
            .cloned()
            .unwrap_or_else(|| ProjectLayerSet::new(project_id))
    }
}

pub fn engine_with_catalog(fetcher: Arc<ScriptedFetcher>, sets: Vec<ProjectLayerSet>) -> Engine {
    EngineBuilder::new()
        .with_profile(EngineProfile::Testing)
        .with_fetcher(fetcher)
        .with_catalog(Arc::new(FixedCatalog { sets }))
        .build()
        .unwrap()
}
