//! Memoized thumbnail pipeline keyed by image id.

use futures::future::{BoxFuture, FutureExt, Shared};

use super::render::render_thumbnail;
use super::{FailureKind, ThumbnailRef, ThumbnailState};
use crate::core::config::ThumbnailConfig;
use crate::prelude::{Arc, HashMap, HashSet, Mutex};
use crate::runtime::async_utils::with_deadline;
use crate::service::fetcher::HttpFetcher;
use crate::service::url::ServiceUrlResolver;
use crate::traits::{CacheStats, Cacheable};
use crate::{Error, Result};

type ThumbnailFuture = Shared<BoxFuture<'static, ThumbnailRef>>;

#[derive(Default)]
struct Inner {
    ready: HashMap<String, ThumbnailRef>,
    pending: HashMap<String, ThumbnailFuture>,
    failed_urls: HashSet<String>,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Counts reported by [`ThumbnailCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailStats {
    pub cached: usize,
    pub loading: usize,
    pub failed: usize,
}

/// Thumbnails per image id.
///
/// Each id is fetched at most once at a time and, once settled, never again
/// until [`retry_failed`](Self::retry_failed) or [`clear`](Self::clear).
/// A URL that already failed settles to the error icon without I/O.
#[derive(Clone)]
pub struct ThumbnailCache {
    fetcher: Arc<dyn HttpFetcher>,
    urls: ServiceUrlResolver,
    config: ThumbnailConfig,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ThumbnailCache {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, urls: ServiceUrlResolver, config: ThumbnailConfig) -> Self {
        Self {
            fetcher,
            urls,
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn peek(&self, image_id: &str) -> ThumbnailState {
        let inner = self.lock();
        if let Some(thumbnail) = inner.ready.get(image_id) {
            ThumbnailState::Ready(thumbnail.clone())
        } else if inner.pending.contains_key(image_id) {
            ThumbnailState::Pending
        } else {
            ThumbnailState::Missing
        }
    }

    pub fn is_loading(&self, image_id: &str) -> bool {
        self.lock().pending.contains_key(image_id)
    }

    pub fn is_cached(&self, image_id: &str) -> bool {
        self.lock().ready.contains_key(image_id)
    }

    pub fn has_failed(&self, url: &str) -> bool {
        self.lock().failed_urls.contains(url)
    }

    /// Thumbnail for `image_id` whose source image lives at `url`.
    /// Never fails; failures settle to a fallback icon.
    pub async fn resolve(&self, image_id: &str, url: &str) -> ThumbnailRef {
        let mut started = None;
        let pending = {
            let mut inner = self.lock();
            if let Some(thumbnail) = inner.ready.get(image_id).cloned() {
                inner.hits += 1;
                return thumbnail;
            }
            if let Some(pending) = inner.pending.get(image_id) {
                pending.clone()
            } else if inner.failed_urls.contains(url) {
                log::debug!("{} previously failed; using fallback for {}", url, image_id);
                let fallback = ThumbnailRef::fallback(FailureKind::Error);
                inner.ready.insert(image_id.to_string(), fallback.clone());
                return fallback;
            } else {
                inner.misses += 1;
                let pending = self.start_fetch(image_id, url, inner.generation);
                inner.pending.insert(image_id.to_string(), pending.clone());
                started = Some(pending.clone());
                pending
            }
        };

        // The fetch settles into the cache even if every caller goes away.
        if let Some(fetch) = started {
            crate::runtime::spawn(fetch.map(|_| ()));
        }
        pending.await
    }

    fn start_fetch(&self, image_id: &str, url: &str, generation: u64) -> ThumbnailFuture {
        let this = self.clone();
        let image_id = image_id.to_string();
        let url = url.to_string();

        async move {
            let deadline = this.config.fetch_timeout;
            let thumbnail = match with_deadline(deadline, this.fetch_and_render(&url)).await {
                Ok(data_url) => ThumbnailRef::Rendered { data_url },
                Err(e) => {
                    let kind = match e {
                        Error::Timeout(_) => FailureKind::Timeout,
                        _ => FailureKind::Error,
                    };
                    log::warn!("thumbnail for image {} failed ({:?}): {}", image_id, kind, e);
                    ThumbnailRef::fallback(kind)
                }
            };

            let mut inner = this.lock();
            if inner.generation == generation {
                inner.pending.remove(&image_id);
                if thumbnail.is_fallback() {
                    inner.failed_urls.insert(url);
                }
                inner.ready.insert(image_id, thumbnail.clone());
            }
            thumbnail
        }
        .boxed()
        .shared()
    }

    /// Fetches through the proxy first. A non-timeout failure of a rewritten
    /// URL is retried once against the original.
    async fn fetch_and_render(&self, url: &str) -> Result<String> {
        let proxied = self.urls.to_proxy_url(url);
        match self.fetch_once(&proxied).await {
            Err(e) if self.config.retry_unproxied && proxied != url => {
                log::debug!("proxied thumbnail {} failed ({}); retrying {}", proxied, e, url);
                self.fetch_once(url).await
            }
            result => result,
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .fetcher
            .get(url, Some("image/*"))
            .await?
            .error_for_status(url)?;
        render_thumbnail(&response.body, &self.config)
    }

    /// Forgets every failed URL and fallback so those images are fetched again.
    pub fn retry_failed(&self) -> usize {
        let mut inner = self.lock();
        inner.failed_urls.clear();
        let before = inner.ready.len();
        inner.ready.retain(|_, thumbnail| !thumbnail.is_fallback());
        let dropped = before - inner.ready.len();
        if dropped > 0 {
            log::info!("cleared {} failed thumbnails for retry", dropped);
        }
        dropped
    }

    /// Drops everything. Fetches already running still settle for their
    /// callers but are not stored.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        inner.pending.clear();
        inner.failed_urls.clear();
        inner.generation += 1;
    }

    pub fn stats(&self) -> ThumbnailStats {
        let inner = self.lock();
        ThumbnailStats {
            cached: inner.ready.len(),
            loading: inner.pending.len(),
            failed: inner.failed_urls.len(),
        }
    }
}

impl Cacheable for ThumbnailCache {
    type Key = String;
    type Value = ThumbnailRef;

    fn get_cached(&self, key: &Self::Key) -> Option<Self::Value> {
        self.lock().ready.get(key).cloned()
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
