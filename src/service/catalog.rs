//! Project metadata API client.

use async_trait::async_trait;

use crate::data::records::ProjectLayerSet;
use crate::prelude::Arc;
use crate::service::fetcher::HttpFetcher;
use crate::Result;

/// Source of a project's layer records.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    /// Never fails: unreachable endpoints contribute no records.
    async fn fetch_layer_set(&self, project_id: &str) -> ProjectLayerSet;
}

/// Reads `/api/projects/{id}/{vector-layers,raster-layers,street-images}/`.
pub struct HttpProjectCatalog {
    fetcher: Arc<dyn HttpFetcher>,
    api_base: String,
}

impl HttpProjectCatalog {
    pub fn new(fetcher: Arc<dyn HttpFetcher>, api_base: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, project_id: &str, collection: &str) -> String {
        format!("{}/api/projects/{}/{}/", self.api_base, project_id, collection)
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .fetcher
            .get(url, Some("application/json"))
            .await?
            .error_for_status(url)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn fetch_collection(&self, project_id: &str, collection: &str) -> serde_json::Value {
        let url = self.endpoint(project_id, collection);
        match self.fetch_json(&url).await {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("failed to fetch {} for project {}: {}", collection, project_id, e);
                serde_json::Value::Null
            }
        }
    }
}

#[async_trait]
impl ProjectCatalog for HttpProjectCatalog {
    async fn fetch_layer_set(&self, project_id: &str) -> ProjectLayerSet {
        let (vector, raster, images) = futures::join!(
            self.fetch_collection(project_id, "vector-layers"),
            self.fetch_collection(project_id, "raster-layers"),
            self.fetch_collection(project_id, "street-images"),
        );

        let set = ProjectLayerSet::from_payloads(project_id, &vector, &raster, &images);
        log::info!(
            "project {}: {} vector, {} raster, {} street images",
            project_id,
            set.vector_layers.len(),
            set.raster_layers.len(),
            set.street_images.len()
        );
        set
    }
}
