//! Click queries across every visible layer.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::core::bounds::Bounds;
use crate::core::config::QueryConfig;
use crate::core::constants::WEB_MERCATOR;
use crate::core::geo::{Point, ViewState};
use crate::data::geojson::{GeoJson, GeoJsonFeature};
use crate::layers::base::LayerKind;
use crate::layers::handle::{LayerHandle, LayerSource};
use crate::prelude::Arc;
use crate::runtime::async_utils::with_deadline;
use crate::service::fetcher::HttpFetcher;
use crate::service::url::append_query;
use crate::service::wms::{get_feature_info_url, FeatureInfoRequest};
use crate::traits::Configurable;
use crate::{Error, Result};

const QUERY_ACCEPT: &str = "application/json,text/plain,*/*";

/// One feature found under a click, tagged with the layer it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub layer_id: String,
    pub layer_name: String,
    pub kind: LayerKind,
    pub feature: GeoJsonFeature,
}

/// Queries layers at a map point and concatenates their features.
///
/// Backend-rendered layers get a feature-info request under a deadline;
/// in-memory layers are hit-tested locally. One layer failing contributes
/// nothing and does not affect the others.
#[derive(Clone)]
pub struct FeatureQueryDispatcher {
    fetcher: Arc<dyn HttpFetcher>,
    config: QueryConfig,
}

impl std::fmt::Debug for FeatureQueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureQueryDispatcher")
            .field("config", &self.config)
            .finish()
    }
}

impl FeatureQueryDispatcher {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, config: QueryConfig) -> Self {
        Self { fetcher, config }
    }

    /// Features under `point` (EPSG:3857) from every visible non-base layer,
    /// raster layers first, then vector, then street images.
    pub async fn query_at_point(&self, point: Point, view: &ViewState, layers: &[LayerHandle]) -> Vec<QueryResult> {
        let mut targets: Vec<(u8, &LayerHandle)> = layers
            .iter()
            .filter(|layer| layer.is_visible())
            .filter_map(|layer| layer.kind().query_rank().map(|rank| (rank, layer)))
            .collect();
        targets.sort_by_key(|(rank, _)| *rank);

        let queries = targets.iter().map(|(_, layer)| self.query_layer_absorbing(layer, point, view));
        let per_layer = join_all(queries).await;

        let results: Vec<QueryResult> = per_layer.into_iter().flatten().collect();
        log::debug!(
            "click at ({:.1}, {:.1}) matched {} features across {} layers",
            point.x,
            point.y,
            results.len(),
            targets.len()
        );
        results
    }

    async fn query_layer_absorbing(&self, layer: &LayerHandle, point: Point, view: &ViewState) -> Vec<QueryResult> {
        match self.query_layer(layer, point, view).await {
            Ok(features) => {
                let layer_name = layer.name();
                features
                    .into_iter()
                    .map(|feature| QueryResult {
                        layer_id: layer.id().to_string(),
                        layer_name: layer_name.clone(),
                        kind: layer.kind(),
                        feature,
                    })
                    .collect()
            }
            Err(e) => {
                log::warn!("query of layer {} failed: {}", layer.id(), e);
                Vec::new()
            }
        }
    }

    /// Features of one layer at `point`.
    pub async fn query_layer(&self, layer: &LayerHandle, point: Point, view: &ViewState) -> Result<Vec<GeoJsonFeature>> {
        let source = layer.source();
        let url = match &source {
            LayerSource::PointFeatures { index, .. } | LayerSource::Connections { index, .. } => {
                let tolerance = self.config.hit_tolerance_px * view.resolution;
                return Ok(index.hit_test(&point, tolerance).into_iter().cloned().collect());
            }
            LayerSource::TiledWms { url, params, .. } | LayerSource::ImageWms { url, params, .. } => {
                let request = FeatureInfoRequest {
                    coordinate: point,
                    view,
                    info_format: &self.config.info_format,
                    feature_count: self.config.feature_count,
                    utf8: layer.kind() == LayerKind::Vector,
                };
                get_feature_info_url(url, params, &request)
            }
            LayerSource::FeatureStream { url, .. } => {
                let extent = self.config.hit_tolerance_px * 2.0 * view.resolution;
                let bbox = Bounds::from_center_and_size(point, extent, extent);
                let bbox = format!("{},{}", bbox.to_bbox_param(), WEB_MERCATOR);
                append_query(url, [("bbox", bbox.as_str())])
            }
            LayerSource::Xyz { .. } => return Ok(Vec::new()),
        };

        with_deadline(self.config.timeout, self.fetch_features(&url)).await
    }

    async fn fetch_features(&self, url: &str) -> Result<Vec<GeoJsonFeature>> {
        let response = self
            .fetcher
            .get(url, Some(QUERY_ACCEPT))
            .await?
            .error_for_status(url)?;
        Ok(GeoJson::from_slice(&response.body)?.into_features())
    }
}

impl Configurable for FeatureQueryDispatcher {
    type Config = QueryConfig;

    fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn set_config(&mut self, config: QueryConfig) -> Result<()> {
        Self::validate_config(&config)?;
        self.config = config;
        Ok(())
    }

    fn validate_config(config: &QueryConfig) -> Result<()> {
        if config.timeout.is_zero() {
            return Err(Error::Config("query timeout must be non-zero".into()));
        }
        if config.feature_count == 0 {
            return Err(Error::Config("feature count must be at least 1".into()));
        }
        if config.hit_tolerance_px.is_nan() || config.hit_tolerance_px < 0.0 {
            return Err(Error::Config("hit tolerance must be non-negative".into()));
        }
        Ok(())
    }
}
