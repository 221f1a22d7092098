use super::base::LayerKind;
use super::handle::LayerHandle;
use super::visibility::VisibilityStore;
use crate::prelude::HashMap;

/// Holds the live layer handles, ordered by z-index for rendering
#[derive(Debug, Default)]
pub struct LayerRegistry {
    /// All handles indexed by ID
    layers: HashMap<String, LayerHandle>,
    /// Ordered list of layer IDs for rendering (sorted by z-index)
    render_order: Vec<String>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle, replacing any handle with the same id
    pub fn add(&mut self, handle: LayerHandle) {
        let layer_id = handle.id().to_string();
        let z_index = handle.z_index();

        if self.layers.insert(layer_id.clone(), handle).is_some() {
            self.render_order.retain(|id| *id != layer_id);
        }

        // Insert in sorted order by z-index
        let insert_pos = self
            .render_order
            .iter()
            .position(|id| {
                self.layers
                    .get(id)
                    .map(|l| l.z_index() > z_index)
                    .unwrap_or(false)
            })
            .unwrap_or(self.render_order.len());

        self.render_order.insert(insert_pos, layer_id);
    }

    pub fn remove(&mut self, layer_id: &str) -> Option<LayerHandle> {
        self.render_order.retain(|id| id != layer_id);
        self.layers.remove(layer_id)
    }

    pub fn get(&self, layer_id: &str) -> Option<&LayerHandle> {
        self.layers.get(layer_id)
    }

    pub fn contains(&self, layer_id: &str) -> bool {
        self.layers.contains_key(layer_id)
    }

    /// Handles in render order, bottom first
    pub fn layers(&self) -> Vec<LayerHandle> {
        self.render_order
            .iter()
            .filter_map(|id| self.layers.get(id).cloned())
            .collect()
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&LayerHandle),
    {
        for id in &self.render_order {
            if let Some(layer) = self.layers.get(id) {
                f(layer);
            }
        }
    }

    pub fn of_kind(&self, kind: LayerKind) -> Vec<LayerHandle> {
        self.layers()
            .into_iter()
            .filter(|layer| layer.kind() == kind)
            .collect()
    }

    /// Visible non-base handles in query order: raster, vector, then street
    /// images, by z-index within each kind.
    pub fn queryable_layers(&self) -> Vec<LayerHandle> {
        let mut layers: Vec<(u8, LayerHandle)> = self
            .layers()
            .into_iter()
            .filter(|layer| layer.is_visible())
            .filter_map(|layer| layer.kind().query_rank().map(|rank| (rank, layer)))
            .collect();
        // Stable, so z-order survives within a kind.
        layers.sort_by_key(|(rank, _)| *rank);
        layers.into_iter().map(|(_, layer)| layer).collect()
    }

    /// Removes every project layer, keeping base layers. Returns removed ids.
    pub fn clear_non_base(&mut self) -> Vec<String> {
        let removed: Vec<String> = self
            .render_order
            .iter()
            .filter(|id| {
                self.layers
                    .get(*id)
                    .map(|l| l.kind() != LayerKind::Base)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        for id in &removed {
            self.remove(id);
        }
        removed
    }

    /// Pushes effective visibility onto every handle. Returns ids that changed.
    pub fn sync_visibility(&self, store: &VisibilityStore) -> Vec<String> {
        let mut changed = Vec::new();
        self.for_each(|layer| {
            let visible = store.effective_visibility(layer.id());
            if layer.is_visible() != visible {
                layer.set_visible(visible);
                changed.push(layer.id().to_string());
            }
        });
        changed
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
