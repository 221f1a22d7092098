//! The engine: one service object owning every cache, the visibility store
//! and the live layer registry.
//!
//! Public operations never fail. Network and parse problems degrade to
//! empty lists, fallback thumbnails or zero-feature query contributions and
//! are logged.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::core::config::{EngineOptions, EngineProfile};
use crate::core::constants::BASE_LAYER_IDS;
use crate::core::geo::{Point, ViewState};
use crate::data::records::ProjectLayerSet;
use crate::layers::base::{LayerKind, LoadingStatus};
use crate::layers::factory::LayerFactory;
use crate::layers::handle::{LayerHandle, LayerSnapshot, LayerSource};
use crate::layers::lifecycle::{LoadEvent, Transition};
use crate::layers::registry::LayerRegistry;
use crate::layers::street::{street_layer_ids, PointStyle, StreetStyler};
use crate::layers::visibility::VisibilityStore;
use crate::prelude::{Arc, Duration, HashMap, Instant, Mutex};
use crate::query::dispatcher::{FeatureQueryDispatcher, QueryResult};
use crate::runtime;
use crate::service::capabilities::CapabilityCache;
use crate::service::catalog::{HttpProjectCatalog, ProjectCatalog};
use crate::service::fetcher::{HttpFetcher, ReqwestFetcher};
use crate::service::resolver::{LayerNameResolver, ValidationResult};
use crate::thumbnail::cache::{ThumbnailCache, ThumbnailStats};
use crate::thumbnail::preload::{PreloadOutcome, PreloadScheduler};
use crate::thumbnail::{ThumbnailRef, ThumbnailState};
use crate::traits::{CacheStats, Cacheable, Configurable};
use crate::Result;

/// A load event reported by the renderer for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerLoadEvent {
    pub layer_id: String,
    pub event: LoadEvent,
    pub at: Instant,
}

/// Aggregated load outcomes since the engine was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub loaded: u64,
    pub retried: u64,
    pub failed: u64,
    /// Most recent load time per layer id.
    pub load_times: HashMap<String, Duration>,
}

impl LoadMetrics {
    fn record(&mut self, layer_id: &str, previous: LoadingStatus, transition: &Transition) {
        if let Some(load_time) = transition.load_time {
            self.loaded += 1;
            self.load_times.insert(layer_id.to_string(), load_time);
        }
        if transition.apply_fallback {
            self.retried += 1;
        } else if transition.status == LoadingStatus::Error && previous != LoadingStatus::Error {
            self.failed += 1;
        }
    }

    pub fn average_load_time(&self) -> Option<Duration> {
        if self.load_times.is_empty() {
            return None;
        }
        let total: Duration = self.load_times.values().sum();
        Some(total / self.load_times.len() as u32)
    }
}

/// Cache counters across the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineCacheStats {
    pub capabilities: CacheStats,
    pub validations: CacheStats,
    pub thumbnails: ThumbnailStats,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    profile: EngineProfile,
    fetcher: Option<Arc<dyn HttpFetcher>>,
    catalog: Option<Arc<dyn ProjectCatalog>>,
    base_url: Option<String>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            profile: EngineProfile::default(),
            fetcher: None,
            catalog: None,
            base_url: None,
        }
    }

    pub fn with_profile(mut self, profile: EngineProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.profile = EngineProfile::Custom(options);
        self
    }

    /// HTTP client for capability, thumbnail and feature requests.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Source of project layer records. Defaults to the HTTP metadata API.
    pub fn with_catalog(mut self, catalog: Arc<dyn ProjectCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Origin that proxy-relative URLs are resolved against by the default fetcher.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn build(self) -> Result<Engine> {
        let options = self.profile.resolve();
        PreloadScheduler::validate_config(&options.preload)?;
        FeatureQueryDispatcher::validate_config(&options.query)?;

        let fetcher: Arc<dyn HttpFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let mut fetcher = ReqwestFetcher::new(&options.http)?;
                if let Some(base_url) = &self.base_url {
                    fetcher = fetcher.with_base_url(base_url)?;
                }
                Arc::new(fetcher)
            }
        };
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(HttpProjectCatalog::new(fetcher.clone(), options.api_base.clone())));

        Ok(Engine::assemble(options, fetcher, catalog))
    }
}

/// Layer resolution and caching engine.
///
/// Construct once and share by reference; every method takes `&self`.
pub struct Engine {
    options: EngineOptions,
    catalog: Arc<dyn ProjectCatalog>,
    capabilities: CapabilityCache,
    resolver: LayerNameResolver,
    thumbnails: ThumbnailCache,
    preloader: PreloadScheduler,
    factory: LayerFactory,
    dispatcher: FeatureQueryDispatcher,
    styler: StreetStyler,
    visibility: Mutex<VisibilityStore>,
    registry: Mutex<LayerRegistry>,
    project: Mutex<Option<ProjectLayerSet>>,
    metrics: Mutex<LoadMetrics>,
    events_tx: Sender<LayerLoadEvent>,
    events_rx: Receiver<LayerLoadEvent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("active_project", &self.active_project())
            .field("layers", &lock(&self.registry).len())
            .field("caches", &self.cache_stats())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn assemble(options: EngineOptions, fetcher: Arc<dyn HttpFetcher>, catalog: Arc<dyn ProjectCatalog>) -> Self {
        let capabilities = CapabilityCache::new(fetcher.clone());
        let resolver = LayerNameResolver::new(capabilities.clone());
        let factory = LayerFactory::new(options.clone(), resolver.clone());
        let thumbnails = ThumbnailCache::new(fetcher.clone(), factory.urls().clone(), options.thumbnail.clone());
        let preloader = PreloadScheduler::new(thumbnails.clone(), options.preload.clone());
        let dispatcher = FeatureQueryDispatcher::new(fetcher, options.query.clone());
        let styler = StreetStyler::new(thumbnails.clone());

        let mut visibility = VisibilityStore::new();
        visibility.apply_base_defaults();
        let mut registry = LayerRegistry::new();
        for handle in factory.build_base(&visibility) {
            registry.add(handle);
        }

        let (events_tx, events_rx) = unbounded();
        Self {
            options,
            catalog,
            capabilities,
            resolver,
            thumbnails,
            preloader,
            factory,
            dispatcher,
            styler,
            visibility: Mutex::new(visibility),
            registry: Mutex::new(registry),
            project: Mutex::new(None),
            metrics: Mutex::new(LoadMetrics::default()),
            events_tx,
            events_rx,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn active_project(&self) -> Option<String> {
        lock(&self.visibility).active_project().map(str::to_string)
    }

    // --- projects ---------------------------------------------------------

    /// Switches to `project_id`: clears temporary overrides, fetches the
    /// project's records and rebuilds its layers.
    pub async fn activate_project(&self, project_id: &str) -> Vec<LayerHandle> {
        {
            let mut visibility = lock(&self.visibility);
            if visibility.activate_project(project_id) {
                log::info!("activating project {}", project_id);
            }
            lock(&self.registry).sync_visibility(&visibility);
        }

        let set = self.catalog.fetch_layer_set(project_id).await;
        if self.active_project().as_deref() != Some(project_id) {
            log::debug!("project {} was replaced while loading; dropping its layers", project_id);
            return Vec::new();
        }
        self.load_project_layers(set)
    }

    /// Replaces the project layers with handles built from `set`.
    ///
    /// Name validation and thumbnail preloading continue in the background.
    pub fn load_project_layers(&self, set: ProjectLayerSet) -> Vec<LayerHandle> {
        let handles = {
            let mut visibility = lock(&self.visibility);
            if visibility.active_project() != Some(set.project_id.as_str()) {
                visibility.activate_project(&set.project_id);
            }
            visibility.apply_project_defaults(&set);

            let mut registry = lock(&self.registry);
            registry.clear_non_base();
            let handles = self.factory.build_project(&set, &visibility);
            for handle in &handles {
                registry.add(handle.clone());
            }
            handles
        };

        for handle in &handles {
            self.factory.validate(handle);
        }

        if !set.street_images.is_empty() {
            let preloader = self.preloader.clone();
            let images = set.street_images.clone();
            runtime::spawn(async move {
                let outcome = preloader.preload(&images).await;
                log::debug!("thumbnail preload finished: {:?}", outcome);
            });
        }

        *lock(&self.project) = Some(set);
        handles
    }

    /// Validates every project layer now and waits for the results.
    pub async fn validate_layers(&self) -> Vec<(String, ValidationResult)> {
        let handles = lock(&self.registry).layers();
        self.factory.validate_now(&handles).await
    }

    /// Every handle of the active project plus the base layers, in render order.
    /// Empty when `project_id` is not the active project.
    pub fn effective_layer_set(&self, project_id: &str) -> Vec<LayerHandle> {
        let active = self.active_project();
        let registry = lock(&self.registry);
        if active.as_deref() == Some(project_id) {
            registry.layers()
        } else {
            registry.of_kind(LayerKind::Base)
        }
    }

    pub fn layer(&self, layer_id: &str) -> Option<LayerHandle> {
        lock(&self.registry).get(layer_id).cloned()
    }

    pub fn layer_snapshots(&self) -> Vec<LayerSnapshot> {
        lock(&self.registry).layers().iter().map(LayerHandle::snapshot).collect()
    }

    // --- visibility -------------------------------------------------------

    /// Sets a layer's visibility. A permanently shown base layer becomes the
    /// active base layer.
    pub fn set_visibility(&self, layer_id: &str, visible: bool, temporary: bool) {
        let mut visibility = lock(&self.visibility);
        let is_base = visibility.kind_of(layer_id) == Some(LayerKind::Base);

        if is_base && !visible && visibility.active_base() == layer_id {
            log::warn!("{} is the active base layer; switch bases instead of hiding it", layer_id);
            return;
        }
        if is_base && visible && !temporary {
            visibility.set_active_base(layer_id);
        } else if temporary {
            visibility.set_temporary(layer_id, Some(visible));
        } else {
            visibility.set_permanent(layer_id, visible);
        }
        lock(&self.registry).sync_visibility(&visibility);
    }

    /// Removes one temporary override.
    pub fn clear_temporary_visibility(&self, layer_id: &str) {
        let mut visibility = lock(&self.visibility);
        visibility.set_temporary(layer_id, None);
        lock(&self.registry).sync_visibility(&visibility);
    }

    pub fn effective_visibility(&self, layer_id: &str) -> bool {
        lock(&self.visibility).effective_visibility(layer_id)
    }

    /// Shows the street layers temporarily.
    pub fn enter_street_view(&self) {
        let mut visibility = lock(&self.visibility);
        visibility.clear_all_temporary();
        if let Some(project_id) = visibility.active_project().map(str::to_string) {
            for id in street_layer_ids(&project_id) {
                visibility.set_temporary(&id, Some(true));
            }
        }
        lock(&self.registry).sync_visibility(&visibility);
    }

    pub fn exit_street_view(&self) {
        let mut visibility = lock(&self.visibility);
        visibility.clear_all_temporary();
        lock(&self.registry).sync_visibility(&visibility);
    }

    /// Makes `base_id` the only visible base layer. Unknown ids are ignored.
    pub fn switch_base_layer(&self, base_id: &str) -> bool {
        if !BASE_LAYER_IDS.contains(&base_id) {
            log::warn!("unknown base layer {}", base_id);
            return false;
        }
        let mut visibility = lock(&self.visibility);
        visibility.set_active_base(base_id);
        lock(&self.registry).sync_visibility(&visibility);
        true
    }

    pub fn active_base_layer(&self) -> String {
        lock(&self.visibility).active_base().to_string()
    }

    // --- clicks -----------------------------------------------------------

    /// Features under `point` (EPSG:3857) across every visible non-base layer.
    pub async fn on_map_click(&self, point: Point, view: &ViewState) -> Vec<QueryResult> {
        let layers = lock(&self.registry).queryable_layers();
        self.dispatcher.query_at_point(point, view, &layers).await
    }

    // --- thumbnails -------------------------------------------------------

    fn image_url(&self, image_id: &str) -> Option<String> {
        lock(&self.project)
            .as_ref()?
            .street_images
            .iter()
            .find(|image| image.id == image_id)?
            .image_url()
            .map(str::to_string)
    }

    /// Cached or pending thumbnail. A known image that has not been
    /// requested yet starts loading in the background.
    pub fn get_thumbnail(&self, image_id: &str) -> ThumbnailState {
        match self.thumbnails.peek(image_id) {
            ThumbnailState::Missing => match self.image_url(image_id) {
                Some(url) => {
                    let thumbnails = self.thumbnails.clone();
                    let image_id = image_id.to_string();
                    runtime::spawn(async move {
                        thumbnails.resolve(&image_id, &url).await;
                    });
                    ThumbnailState::Pending
                }
                None => ThumbnailState::Missing,
            },
            state => state,
        }
    }

    /// Waits for the thumbnail of a known image.
    pub async fn thumbnail(&self, image_id: &str) -> Option<ThumbnailRef> {
        let url = self.image_url(image_id)?;
        Some(self.thumbnails.resolve(image_id, &url).await)
    }

    /// Warms thumbnails of the active project's street images.
    pub async fn preload_thumbnails(&self) -> PreloadOutcome {
        let images = lock(&self.project)
            .as_ref()
            .map(|set| set.street_images.clone())
            .unwrap_or_default();
        self.preloader.preload(&images).await
    }

    /// Style for one street-image point at `resolution`.
    pub fn street_image_style(&self, image_id: &str, resolution: f64) -> Option<PointStyle> {
        let project_id = self.active_project()?;
        let [images_id, _, _] = street_layer_ids(&project_id);
        let handle = self.layer(&images_id)?;
        handle.with_source(|source| match source {
            LayerSource::PointFeatures { features, .. } => features
                .iter()
                .find(|feature| feature.image_id == image_id)
                .map(|feature| self.styler.style_for(feature, resolution)),
            _ => None,
        })
    }

    pub fn retry_failed_thumbnails(&self) -> usize {
        self.thumbnails.retry_failed()
    }

    // --- load lifecycle ---------------------------------------------------

    /// Channel the renderer reports load events on.
    pub fn load_event_sender(&self) -> Sender<LayerLoadEvent> {
        self.events_tx.clone()
    }

    pub fn report_load_event(&self, layer_id: &str, event: LoadEvent) {
        let _ = self.events_tx.send(LayerLoadEvent {
            layer_id: layer_id.to_string(),
            event,
            at: Instant::now(),
        });
    }

    /// Applies every queued load event to its layer. Events for layers that
    /// no longer exist are dropped.
    pub fn process_load_events(&self) -> Vec<(String, Transition)> {
        let mut applied = Vec::new();
        while let Ok(message) = self.events_rx.try_recv() {
            let Some(handle) = self.layer(&message.layer_id) else {
                log::debug!("load event for unknown layer {}", message.layer_id);
                continue;
            };
            let previous = handle.status();
            let transition = handle.handle_load_event(message.event, message.at);
            lock(&self.metrics).record(&message.layer_id, previous, &transition);
            applied.push((message.layer_id, transition));
        }
        applied
    }

    pub fn load_metrics(&self) -> LoadMetrics {
        lock(&self.metrics).clone()
    }

    // --- caches -----------------------------------------------------------

    /// Drops capability, validation and thumbnail caches.
    pub fn clear_caches(&self) {
        self.capabilities.clear();
        self.resolver.clear();
        self.thumbnails.clear();
        log::info!("engine caches cleared");
    }

    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            capabilities: self.capabilities.cache_stats(),
            validations: self.resolver.cache_stats(),
            thumbnails: self.thumbnails.stats(),
        }
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    pub fn resolver(&self) -> &LayerNameResolver {
        &self.resolver
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }
}
