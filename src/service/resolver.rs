//! Layer-name validation and correction against a service's advertised layers.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};

use super::capabilities::CapabilityCache;
use crate::core::constants::LAYER_NAME_PATTERNS;
use crate::prelude::{Arc, HashMap, Mutex};
use crate::traits::{CacheStats, Cacheable};

/// Outcome of matching a requested layer name against a capability list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub corrected_name: String,
    pub was_exact_match: bool,
    pub available_layers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn matched(name: &str, exact: bool, available: &[String]) -> Self {
        Self {
            is_valid: true,
            corrected_name: name.to_string(),
            was_exact_match: exact,
            available_layers: available.to_vec(),
            error: None,
        }
    }

    /// Whether the requested name should be replaced on the live layer.
    pub fn was_corrected(&self, requested: &str) -> bool {
        self.is_valid && self.corrected_name != requested
    }

    /// Message for a broken-layer indicator, listing what the service offers.
    pub fn diagnostic(&self, requested: &str) -> String {
        let available = if self.available_layers.is_empty() {
            "none found".to_string()
        } else {
            self.available_layers.join(", ")
        };
        format!(
            "Layer '{}' not found. Available layers: {}",
            requested, available
        )
    }
}

/// Matches `requested` against `available`; the first rule that applies wins:
///
/// 1. exact match
/// 2. case-insensitive substring match in either direction
/// 3. first name containing one of [`LAYER_NAME_PATTERNS`], tried pattern by pattern
/// 4. the first available name
///
/// An empty list is invalid and keeps the requested name.
pub fn match_layer_name(requested: &str, available: &[String]) -> ValidationResult {
    if available.is_empty() {
        return ValidationResult {
            is_valid: false,
            corrected_name: requested.to_string(),
            was_exact_match: false,
            available_layers: Vec::new(),
            error: Some("No layers found on service".to_string()),
        };
    }

    if available.iter().any(|name| name == requested) {
        return ValidationResult::matched(requested, true, available);
    }

    let requested_lower = requested.to_lowercase();
    if let Some(name) = available.iter().find(|name| {
        let lower = name.to_lowercase();
        lower.contains(&requested_lower) || requested_lower.contains(&lower)
    }) {
        return ValidationResult::matched(name, false, available);
    }

    let by_pattern = LAYER_NAME_PATTERNS.iter().find_map(|pattern| {
        available
            .iter()
            .find(|name| name.to_lowercase().contains(pattern))
    });
    if let Some(name) = by_pattern {
        return ValidationResult::matched(name, false, available);
    }

    ValidationResult::matched(&available[0], false, available)
}

type ValidationKey = (String, String);
type ValidationFuture = Shared<BoxFuture<'static, ValidationResult>>;

#[derive(Default)]
struct Inner {
    ready: HashMap<ValidationKey, ValidationResult>,
    pending: HashMap<ValidationKey, ValidationFuture>,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Resolves requested layer names per `(service_url, name)`, memoized and
/// deduplicated like [`CapabilityCache`].
#[derive(Clone)]
pub struct LayerNameResolver {
    capabilities: CapabilityCache,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for LayerNameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerNameResolver")
            .field("stats", &self.cache_stats())
            .finish()
    }
}

impl LayerNameResolver {
    pub fn new(capabilities: CapabilityCache) -> Self {
        Self {
            capabilities,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn capabilities(&self) -> &CapabilityCache {
        &self.capabilities
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cached(&self, service_url: &str, requested: &str) -> Option<ValidationResult> {
        self.lock()
            .ready
            .get(&(service_url.to_string(), requested.to_string()))
            .cloned()
    }

    pub async fn resolve(&self, service_url: &str, requested: &str) -> ValidationResult {
        let key = (service_url.to_string(), requested.to_string());
        let mut started = None;
        let pending = {
            let mut inner = self.lock();
            if let Some(result) = inner.ready.get(&key).cloned() {
                inner.hits += 1;
                return result;
            }
            match inner.pending.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    inner.misses += 1;
                    let pending = self.start_resolution(key.clone(), inner.generation);
                    inner.pending.insert(key, pending.clone());
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

    fn start_resolution(&self, key: ValidationKey, generation: u64) -> ValidationFuture {
        let capabilities = self.capabilities.clone();
        let inner = self.inner.clone();

        async move {
            let available = capabilities.discover(&key.0).await;
            let result = match_layer_name(&key.1, &available);
            if !result.is_valid {
                log::warn!("layer '{}' could not be validated at {}", key.1, key.0);
            } else if !result.was_exact_match {
                log::info!(
                    "layer '{}' at {} resolved to '{}'",
                    key.1,
                    key.0,
                    result.corrected_name
                );
            }

            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.generation == generation {
                inner.pending.remove(&key);
                inner.ready.insert(key, result.clone());
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Drops every stored result. The capability cache is cleared separately.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        inner.pending.clear();
        inner.generation += 1;
    }
}

impl Cacheable for LayerNameResolver {
    type Key = ValidationKey;
    type Value = ValidationResult;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let result = match_layer_name("Roads", &names(&["Rivers_2020", "Roads"]));
        assert!(result.is_valid);
        assert!(result.was_exact_match);
        assert_eq!(result.corrected_name, "Roads");
    }

    #[test]
    fn test_case_insensitive_substring() {
        let result = match_layer_name("rivers", &names(&["Rivers_2020", "Roads"]));
        assert!(result.is_valid);
        assert!(!result.was_exact_match);
        assert_eq!(result.corrected_name, "Rivers_2020");
        assert!(result.was_corrected("rivers"));

        // The requested name may also contain the advertised one.
        let result = match_layer_name("ws:Roads", &names(&["Rivers_2020", "roads"]));
        assert_eq!(result.corrected_name, "roads");
    }

    #[test]
    fn test_pattern_order_wins_over_list_order() {
        let available = names(&["ws:city_map", "ws:ortho_tif", "ws:parcels"]);
        let result = match_layer_name("survey_2021", &available);
        // "tif" is tried before "map".
        assert_eq!(result.corrected_name, "ws:ortho_tif");
    }

    #[test]
    fn test_first_entry_fallback() {
        let result = match_layer_name("zzz", &names(&["parcels", "buildings"]));
        assert!(result.is_valid);
        assert_eq!(result.corrected_name, "parcels");
    }

    #[test]
    fn test_empty_list_is_invalid() {
        let result = match_layer_name("zzz", &[]);
        assert!(!result.is_valid);
        assert_eq!(result.corrected_name, "zzz");
        assert!(result.available_layers.is_empty());
        assert!(result.error.is_some());
        assert!(!result.was_corrected("zzz"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let available = names(&["b_world", "a_raster", "c"]);
        let first = match_layer_name("q", &available);
        for _ in 0..10 {
            assert_eq!(match_layer_name("q", &available), first);
        }
        assert_eq!(first.corrected_name, "a_raster");
    }

    #[test]
    fn test_diagnostic_lists_layers() {
        let result = match_layer_name("x", &[]);
        assert_eq!(
            result.diagnostic("x"),
            "Layer 'x' not found. Available layers: none found"
        );
        let result = match_layer_name("x", &names(&["a", "b"]));
        assert!(result.diagnostic("x").ends_with("a, b"));
    }
}
