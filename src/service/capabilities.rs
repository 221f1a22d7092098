//! Capability discovery: the advertised layer names of a service endpoint,
//! fetched once and memoized for the process lifetime.

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::prelude::{Arc, HashMap, Mutex};
use crate::service::fetcher::HttpFetcher;
use crate::service::url::append_query;
use crate::traits::{CacheStats, Cacheable};
use crate::Result;
use crate::core::constants::WMS_VERSION_1_3_0;

type DiscoveryFuture = Shared<BoxFuture<'static, Arc<Vec<String>>>>;

#[derive(Default)]
struct Inner {
    ready: HashMap<String, Arc<Vec<String>>>,
    pending: HashMap<String, DiscoveryFuture>,
    /// Bumped by `clear` so discoveries started earlier don't repopulate the cache.
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Per-endpoint cache of advertised layer names.
///
/// At most one capability request is in flight per endpoint; concurrent
/// callers share it. A failed discovery caches an empty list, which callers
/// must read as "unknown", not "no layers".
#[derive(Clone)]
pub struct CapabilityCache {
    fetcher: Arc<dyn HttpFetcher>,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for CapabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCache")
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl CapabilityCache {
    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the cached list for `service_url` without any I/O.
    pub fn cached(&self, service_url: &str) -> Option<Arc<Vec<String>>> {
        self.lock().ready.get(service_url).cloned()
    }

    /// Advertised layer names of `service_url`, in document order.
    pub async fn discover(&self, service_url: &str) -> Arc<Vec<String>> {
        let mut started = None;
        let pending = {
            let mut inner = self.lock();
            if let Some(names) = inner.ready.get(service_url).cloned() {
                inner.hits += 1;
                log::debug!("capabilities cache hit for {}", service_url);
                return names;
            }

            match inner.pending.get(service_url) {
                Some(pending) => pending.clone(),
                None => {
                    inner.misses += 1;
                    let pending = self.start_discovery(service_url, inner.generation);
                    inner.pending.insert(service_url.to_string(), pending.clone());
                    started = Some(pending.clone());
                    pending
                }
            }
        };

        if let Some(work) = started {
            crate::runtime::spawn(work.map(|_| ()));
        }
        pending.await
    }

    fn start_discovery(&self, service_url: &str, generation: u64) -> DiscoveryFuture {
        let fetcher = self.fetcher.clone();
        let inner = self.inner.clone();
        let key = service_url.to_string();

        async move {
            let names = match fetch_layer_names(fetcher.as_ref(), &key).await {
                Ok(names) => {
                    log::debug!("discovered {} layers at {}", names.len(), key);
                    names
                }
                Err(e) => {
                    log::warn!("capability discovery failed for {}: {}", key, e);
                    Vec::new()
                }
            };
            let names = Arc::new(names);

            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.generation == generation {
                inner.pending.remove(&key);
                inner.ready.insert(key, names.clone());
            }
            names
        }
        .boxed()
        .shared()
    }

    /// Drops every cached list. Discoveries already running still resolve for
    /// their callers but are not stored.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        inner.pending.clear();
        inner.generation += 1;
    }
}

impl Cacheable for CapabilityCache {
    type Key = String;
    type Value = Arc<Vec<String>>;

    fn get_cached(&self, key: &Self::Key) -> Option<Self::Value> {
        self.cached(key)
    }

    fn cache(&self, key: Self::Key, value: Self::Value) {
        self.lock().ready.insert(key, value);
    }

    fn invalidate(&self, key: &Self::Key) {
        self.lock().ready.remove(key);
    }

    fn clear_cache(&self) {
        self.clear();
    }

    fn cache_stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.ready.len(),
        }
    }
}

/// Capability request URL for a service endpoint.
pub fn capabilities_url(service_url: &str) -> String {
    append_query(
        service_url,
        [
            ("service", "WMS"),
            ("version", WMS_VERSION_1_3_0),
            ("request", "GetCapabilities"),
        ],
    )
}

async fn fetch_layer_names(fetcher: &dyn HttpFetcher, service_url: &str) -> Result<Vec<String>> {
    let url = capabilities_url(service_url);
    let response = fetcher
        .get(&url, Some("text/xml"))
        .await?
        .error_for_status(&url)?;
    parse_layer_names(&response.text())
}

/// Text of every `Name` element directly inside a `Layer`, trimmed, in
/// document order. Namespaces are ignored so 1.1.1 and 1.3.0 documents both parse.
pub fn parse_layer_names(xml: &str) -> Result<Vec<String>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(xml, options)?;

    Ok(doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Name")
        .filter(|node| {
            node.parent_element()
                .map(|parent| parent.tag_name().name() == "Layer")
                .unwrap_or(false)
        })
        .filter_map(|node| node.text())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}
