//! Per-layer visibility: permanent values, temporary overrides and category
//! defaults, resolved in that order.

use serde::{Deserialize, Serialize};

use super::base::LayerKind;
use super::street::street_layer_ids;
use crate::core::constants::{BASE_LAYER_IDS, DEFAULT_BASE_LAYER};
use crate::data::records::{LayerRecord, ProjectLayerSet};
use crate::prelude::HashMap;

/// Visibility state shared by every project.
///
/// Permanent entries live for the process lifetime. Temporary entries shadow
/// them during transient modes such as street view and are wiped whenever
/// the active project changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityStore {
    permanent: HashMap<String, bool>,
    temporary: HashMap<String, bool>,
    kinds: HashMap<String, LayerKind>,
    active_project: Option<String>,
    active_base: String,
}

impl Default for VisibilityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityStore {
    pub fn new() -> Self {
        let mut store = Self {
            permanent: HashMap::default(),
            temporary: HashMap::default(),
            kinds: HashMap::default(),
            active_project: None,
            active_base: DEFAULT_BASE_LAYER.to_string(),
        };
        for id in BASE_LAYER_IDS {
            store.kinds.insert(id.to_string(), LayerKind::Base);
        }
        store
    }

    pub fn set_permanent(&mut self, id: &str, visible: bool) {
        self.permanent.insert(id.to_string(), visible);
    }

    /// Sets a temporary override, or removes it when `visible` is `None`.
    pub fn set_temporary(&mut self, id: &str, visible: Option<bool>) {
        match visible {
            Some(visible) => {
                self.temporary.insert(id.to_string(), visible);
            }
            None => {
                self.temporary.remove(id);
            }
        }
    }

    pub fn clear_all_temporary(&mut self) {
        if !self.temporary.is_empty() {
            log::debug!("clearing {} temporary visibility overrides", self.temporary.len());
        }
        self.temporary.clear();
    }

    pub fn permanent(&self, id: &str) -> Option<bool> {
        self.permanent.get(id).copied()
    }

    pub fn temporary(&self, id: &str) -> Option<bool> {
        self.temporary.get(id).copied()
    }

    pub fn has_temporary_overrides(&self) -> bool {
        !self.temporary.is_empty()
    }

    /// Associates `id` with a kind so its category default can be found.
    pub fn register(&mut self, id: &str, kind: LayerKind) {
        self.kinds.insert(id.to_string(), kind);
    }

    pub fn kind_of(&self, id: &str) -> Option<LayerKind> {
        self.kinds.get(id).copied().or_else(|| infer_kind(id))
    }

    /// Temporary value, else permanent value, else the category default.
    pub fn effective_visibility(&self, id: &str) -> bool {
        if let Some(visible) = self.temporary.get(id) {
            return *visible;
        }
        if let Some(visible) = self.permanent.get(id) {
            return *visible;
        }
        self.category_default(id)
    }

    fn category_default(&self, id: &str) -> bool {
        match self.kind_of(id) {
            Some(LayerKind::Base) => id == self.active_base,
            Some(kind) => kind.default_visibility(),
            None => false,
        }
    }

    /// Writes a permanent default for every layer of `set` that has none yet.
    /// Values set earlier, by a caller or a previous call, are never replaced.
    pub fn apply_project_defaults(&mut self, set: &ProjectLayerSet) {
        for record in set.records() {
            if let LayerRecord::StreetImage(_) = record {
                continue;
            }
            let id = record.layer_id();
            let kind = record.kind();
            self.register(&id, kind);
            self.permanent
                .entry(id)
                .or_insert_with(|| kind.default_visibility());
        }

        for id in street_layer_ids(&set.project_id) {
            self.register(&id, LayerKind::StreetImage);
            self.permanent.entry(id).or_insert(false);
        }

        self.apply_base_defaults();
    }

    /// Gives every base layer a permanent value, showing only the active one.
    pub fn apply_base_defaults(&mut self) {
        for id in BASE_LAYER_IDS {
            let visible = *id == self.active_base;
            self.permanent.entry(id.to_string()).or_insert(visible);
        }
    }

    pub fn active_base(&self) -> &str {
        &self.active_base
    }

    /// Makes `id` the only visible base layer.
    pub fn set_active_base(&mut self, id: &str) {
        self.active_base = id.to_string();
        self.register(id, LayerKind::Base);
        let bases: Vec<String> = self
            .kinds
            .iter()
            .filter(|(_, kind)| **kind == LayerKind::Base)
            .map(|(base, _)| base.clone())
            .collect();
        for base in bases {
            let visible = base == id;
            self.permanent.insert(base, visible);
        }
    }

    pub fn active_project(&self) -> Option<&str> {
        self.active_project.as_deref()
    }

    /// Switches the active project. Temporary overrides are cleared even when
    /// the project does not change.
    pub fn activate_project(&mut self, project_id: &str) -> bool {
        self.clear_all_temporary();
        let changed = self.active_project.as_deref() != Some(project_id);
        self.active_project = Some(project_id.to_string());
        changed
    }
}

fn infer_kind(id: &str) -> Option<LayerKind> {
    if id.starts_with("raster_") {
        Some(LayerKind::Raster)
    } else if id.starts_with("vector_") {
        Some(LayerKind::Vector)
    } else if id.starts_with("street_") {
        Some(LayerKind::StreetImage)
    } else if BASE_LAYER_IDS.contains(&id) {
        Some(LayerKind::Base)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::{RasterRecord, VectorRecord};

    fn project(id: &str) -> ProjectLayerSet {
        let mut set = ProjectLayerSet::new(id);
        set.raster_layers.push(
            serde_json::from_value::<RasterRecord>(serde_json::json!({
                "id": 3,
                "geoserver_url": "http://192.168.29.247:8080/geoserver/ws/wms",
                "geoserver_layer_name": "ws:ortho",
            }))
            .unwrap(),
        );
        set.vector_layers.push(
            serde_json::from_value::<VectorRecord>(serde_json::json!({
                "id": 7,
                "name": "roads",
                "geoserver_url": "http://192.168.29.247:8080/geoserver/ws/ows",
            }))
            .unwrap(),
        );
        set
    }

    #[test]
    fn test_temporary_shadows_permanent() {
        let mut store = VisibilityStore::new();
        store.set_permanent("vector_7", true);
        store.set_temporary("vector_7", Some(false));
        assert!(!store.effective_visibility("vector_7"));

        store.clear_all_temporary();
        assert!(store.effective_visibility("vector_7"));
    }

    #[test]
    fn test_clearing_one_temporary_entry() {
        let mut store = VisibilityStore::new();
        store.set_permanent("raster_1", false);
        store.set_temporary("raster_1", Some(true));
        assert!(store.effective_visibility("raster_1"));
        store.set_temporary("raster_1", None);
        assert!(!store.effective_visibility("raster_1"));
    }

    #[test]
    fn test_category_defaults() {
        let store = VisibilityStore::new();
        assert!(store.effective_visibility("vector_1"));
        assert!(!store.effective_visibility("raster_1"));
        assert!(!store.effective_visibility("street_images_9"));
        assert!(store.effective_visibility("satellite"));
        assert!(!store.effective_visibility("osm"));
        assert!(!store.effective_visibility("unknown"));
    }

    #[test]
    fn test_project_defaults_never_overwrite() {
        let mut store = VisibilityStore::new();
        let set = project("p1");

        store.apply_project_defaults(&set);
        assert_eq!(store.permanent("raster_3"), Some(false));
        assert_eq!(store.permanent("vector_7"), Some(true));
        assert_eq!(store.permanent("street_images_p1"), Some(false));
        assert_eq!(store.permanent("terrain"), Some(false));

        store.set_permanent("raster_3", true);
        store.set_permanent("vector_7", false);
        store.apply_project_defaults(&set);

        assert_eq!(store.permanent("raster_3"), Some(true));
        assert_eq!(store.permanent("vector_7"), Some(false));
    }

    #[test]
    fn test_project_switch_clears_only_temporary() {
        let mut store = VisibilityStore::new();
        store.set_permanent("raster_3", true);
        store.set_temporary("raster_3", Some(false));
        store.set_temporary("street_images_p1", Some(true));

        assert!(store.activate_project("p2"));
        assert!(!store.has_temporary_overrides());
        assert_eq!(store.permanent("raster_3"), Some(true));
        assert!(store.effective_visibility("raster_3"));

        // Re-activating the same project still clears overrides.
        store.set_temporary("raster_3", Some(false));
        assert!(!store.activate_project("p2"));
        assert!(store.effective_visibility("raster_3"));
    }

    #[test]
    fn test_single_active_base() {
        let mut store = VisibilityStore::new();
        store.apply_base_defaults();
        store.set_active_base("osm");

        assert_eq!(store.active_base(), "osm");
        let visible: Vec<_> = BASE_LAYER_IDS
            .iter()
            .filter(|id| store.effective_visibility(id))
            .collect();
        assert_eq!(visible, vec![&"osm"]);
    }
}
