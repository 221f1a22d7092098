//! Builds layer handles from project records.
//!
//! Construction is synchronous and optimistic: handles request the recorded
//! service layer name right away. Name validation runs afterwards and
//! corrects the live handle in place.

use futures::future::join_all;

use super::base::{LayerKind, LayerProperties};
use super::handle::{LayerHandle, LayerSource};
use super::street::{
    street_connections_id, street_images_id, street_overlay_id, ConnectionStyle, StreetLayerData,
};
use super::visibility::VisibilityStore;
use crate::core::config::EngineOptions;
use crate::core::constants::{STREET_OVERLAY_OPACITY, WEB_MERCATOR};
use crate::data::records::{BaseRecord, ImageRecord, ProjectLayerSet, RasterRecord, VectorRecord};
use crate::prelude::Arc;
use crate::runtime::{self, AsyncHandle};
use crate::service::resolver::{LayerNameResolver, ValidationResult};
use crate::service::url::{append_query, ServiceUrlResolver};
use crate::service::wms::WmsParams;

#[derive(Debug, Clone)]
pub struct LayerFactory {
    options: EngineOptions,
    urls: ServiceUrlResolver,
    resolver: LayerNameResolver,
}

impl LayerFactory {
    pub fn new(options: EngineOptions, resolver: LayerNameResolver) -> Self {
        Self {
            urls: ServiceUrlResolver::new(options.proxy.clone()),
            options,
            resolver,
        }
    }

    pub fn urls(&self) -> &ServiceUrlResolver {
        &self.urls
    }

    /// Whether a raster of this size is drawn from tiles rather than one image.
    pub fn should_tile(&self, record: &RasterRecord) -> bool {
        let threshold = self.options.raster.tiling_threshold_px;
        record.width.unwrap_or(0) > threshold || record.height.unwrap_or(0) > threshold
    }

    /// `None` when the record lacks a service URL or layer name.
    pub fn build_raster(&self, record: &RasterRecord, position: usize, store: &VisibilityStore) -> Option<LayerHandle> {
        if record.service_url.trim().is_empty() || record.service_layer_name.trim().is_empty() {
            log::warn!("raster layer {} has no service URL or layer name; skipped", record.id);
            return None;
        }

        let id = format!("raster_{}", record.id);
        let url = self.urls.to_proxy_url(&record.service_url);
        let layer = record.service_layer_name.as_str();
        let source = if self.should_tile(record) {
            LayerSource::TiledWms {
                url,
                params: WmsParams::raster_tiled(layer),
                tile_cache_size: self.options.raster.tile_cache_size,
            }
        } else {
            LayerSource::ImageWms {
                url,
                params: WmsParams::raster_untiled(layer),
                ratio: self.options.raster.untiled_ratio,
            }
        };
        log::debug!("raster {} uses {}", id, source.name());

        let properties = LayerProperties::new(id.as_str(), record.name(), LayerKind::Raster)
            .with_z_index(LayerKind::Raster.z_index_band() + position as i32)
            .with_visible(store.effective_visibility(&id));
        Some(LayerHandle::new(properties, source).with_fallback(WmsParams::raster_fallback()))
    }

    pub fn build_vector(&self, record: &VectorRecord, position: usize, store: &VisibilityStore) -> Option<LayerHandle> {
        let Some(layer) = record.layer_name() else {
            log::warn!("vector layer {} has no layer name; skipped", record.id);
            return None;
        };
        if record.service_url.trim().is_empty() {
            log::warn!("vector layer {} has no service URL; skipped", record.id);
            return None;
        }

        let id = format!("vector_{}", record.id);
        let properties = LayerProperties::new(id.as_str(), record.name(), LayerKind::Vector)
            .with_z_index(LayerKind::Vector.z_index_band() + position as i32)
            .with_visible(store.effective_visibility(&id));

        if self.options.vector_feature_stream {
            let proxied = self.urls.to_proxy_url(&record.service_url);
            let base = proxied.split('?').next().unwrap_or_default();
            let url = append_query(
                base,
                [
                    ("service", "WFS"),
                    ("version", "2.0.0"),
                    ("request", "GetFeature"),
                    ("typeName", layer),
                    ("outputFormat", "application/json"),
                    ("srsName", WEB_MERCATOR),
                ],
            );
            let source = LayerSource::FeatureStream {
                url,
                type_name: layer.to_string(),
            };
            return Some(LayerHandle::new(properties, source));
        }

        let source = LayerSource::TiledWms {
            url: self.urls.to_wms_endpoint(&record.service_url),
            params: WmsParams::vector_tiled(layer),
            tile_cache_size: self.options.raster.tile_cache_size,
        };
        Some(LayerHandle::new(properties, source).with_fallback(WmsParams::vector_fallback()))
    }

    /// Point, overlay and connection handles for a project's street images.
    pub fn build_street_layers(&self, project_id: &str, images: &[ImageRecord], store: &VisibilityStore) -> Vec<LayerHandle> {
        let data = StreetLayerData::from_images(images, &self.urls);
        let band = LayerKind::StreetImage.z_index_band();
        let mut handles = Vec::new();

        if data.features.is_empty() {
            if !images.is_empty() {
                log::warn!("project {} has no street images with usable coordinates", project_id);
            }
        } else {
            let id = street_images_id(project_id);
            let properties = LayerProperties::new(id.as_str(), "Street Images", LayerKind::StreetImage)
                .with_z_index(band)
                .with_visible(store.effective_visibility(&id));
            let index = data.point_index();
            handles.push(LayerHandle::new(
                properties,
                LayerSource::PointFeatures {
                    features: Arc::new(data.features.clone()),
                    index: Arc::new(index),
                },
            ));
        }

        if let Some((url, layers)) = &data.overlay {
            let id = street_overlay_id(project_id);
            let properties = LayerProperties::new(id.as_str(), "Street Images Layer (WMS)", LayerKind::StreetImage)
                .with_z_index(band + 1)
                .with_opacity(STREET_OVERLAY_OPACITY)
                .with_visible(store.effective_visibility(&id));
            handles.push(LayerHandle::new(
                properties,
                LayerSource::TiledWms {
                    url: url.clone(),
                    params: WmsParams::street_overlay(layers),
                    tile_cache_size: self.options.raster.tile_cache_size,
                },
            ));
        }

        if !data.connections.is_empty() {
            let id = street_connections_id(project_id);
            let properties = LayerProperties::new(id.as_str(), "Street Image Connections", LayerKind::StreetImage)
                .with_z_index(band + 2)
                .with_visible(store.effective_visibility(&id));
            let index = data.connection_index();
            handles.push(LayerHandle::new(
                properties,
                LayerSource::Connections {
                    connections: Arc::new(data.connections),
                    index: Arc::new(index),
                    style: ConnectionStyle::default(),
                },
            ));
        }

        handles
    }

    pub fn build_base(&self, store: &VisibilityStore) -> Vec<LayerHandle> {
        BaseRecord::builtin()
            .into_iter()
            .map(|record| {
                let properties = LayerProperties::new(record.id.as_str(), record.display_name, LayerKind::Base)
                    .with_visible(store.effective_visibility(&record.id));
                LayerHandle::new(
                    properties,
                    LayerSource::Xyz {
                        url_template: record.url_template,
                    },
                )
            })
            .collect()
    }

    /// Every handle of a project: rasters, vectors, then street layers.
    /// Records that cannot be built are left out.
    pub fn build_project(&self, set: &ProjectLayerSet, store: &VisibilityStore) -> Vec<LayerHandle> {
        let rasters = set
            .raster_layers
            .iter()
            .enumerate()
            .filter_map(|(i, record)| self.build_raster(record, i, store));
        let vectors = set
            .vector_layers
            .iter()
            .enumerate()
            .filter_map(|(i, record)| self.build_vector(record, i, store));

        let mut handles: Vec<LayerHandle> = rasters.chain(vectors).collect();
        handles.extend(self.build_street_layers(&set.project_id, &set.street_images, store));
        log::info!("built {} layers for project {}", handles.len(), set.project_id);
        handles
    }

    /// Checks a handle's layer name against its service in the background.
    pub fn validate(&self, handle: &LayerHandle) -> Option<Box<dyn AsyncHandle>> {
        validation_target(handle)?;
        let resolver = self.resolver.clone();
        let handle = handle.clone();
        Some(runtime::spawn(async move {
            validate_handle(&resolver, &handle).await;
        }))
    }

    /// Validates every raster and vector handle concurrently.
    pub async fn validate_now(&self, handles: &[LayerHandle]) -> Vec<(String, ValidationResult)> {
        let checks = handles
            .iter()
            .filter(|handle| validation_target(handle).is_some())
            .map(|handle| async move {
                validate_handle(&self.resolver, handle)
                    .await
                    .map(|result| (handle.id().to_string(), result))
            });
        join_all(checks).await.into_iter().flatten().collect()
    }
}

/// Service endpoint and requested name for raster and vector WMS handles.
fn validation_target(handle: &LayerHandle) -> Option<(String, String)> {
    if !matches!(handle.kind(), LayerKind::Raster | LayerKind::Vector) {
        return None;
    }
    handle.with_source(|source| match source {
        LayerSource::TiledWms { url, params, .. } | LayerSource::ImageWms { url, params, .. } => {
            params.layers().map(|layers| (url.clone(), layers.to_string()))
        }
        _ => None,
    })
}

async fn validate_handle(resolver: &LayerNameResolver, handle: &LayerHandle) -> Option<ValidationResult> {
    let (url, requested) = validation_target(handle)?;
    let result = resolver.resolve(&url, &requested).await;

    if result.was_corrected(&requested) && handle.set_layer_name(&result.corrected_name) {
        log::info!(
            "layer {}: '{}' corrected to '{}'",
            handle.id(),
            requested,
            result.corrected_name
        );
    }
    if !result.is_valid {
        handle.set_diagnostic(Some(result.diagnostic(&requested)));
    }
    Some(result)
}
