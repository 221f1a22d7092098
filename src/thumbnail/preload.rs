//! Batched thumbnail warm-up.

use futures::future::join_all;

use super::cache::ThumbnailCache;
use crate::core::config::PreloadConfig;
use crate::data::records::ImageRecord;
use crate::runtime::async_utils::async_delay;
use crate::traits::Configurable;
use crate::{Error, Result};

/// Result of one [`PreloadScheduler::preload`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadOutcome {
    pub requested: usize,
    pub rendered: usize,
    pub fallbacks: usize,
}

/// Warms a [`ThumbnailCache`] in fixed-size batches.
///
/// Batches run one after another with a pause between them, so no more than
/// `batch_size` fetches are ever outstanding on behalf of a preload.
#[derive(Debug, Clone)]
pub struct PreloadScheduler {
    cache: ThumbnailCache,
    config: PreloadConfig,
}

impl PreloadScheduler {
    pub fn new(cache: ThumbnailCache, config: PreloadConfig) -> Self {
        Self { cache, config }
    }

    pub async fn preload(&self, images: &[ImageRecord]) -> PreloadOutcome {
        let queue: Vec<(&str, &str)> = images
            .iter()
            .filter(|image| !image.id.is_empty())
            .filter_map(|image| image.image_url().map(|url| (image.id.as_str(), url)))
            .filter(|(id, _)| !self.cache.is_cached(id))
            .collect();

        let mut outcome = PreloadOutcome {
            requested: queue.len(),
            ..PreloadOutcome::default()
        };
        if queue.is_empty() {
            return outcome;
        }

        let batch_size = self.config.batch_size.max(1);
        let batches = queue.chunks(batch_size).count();
        log::debug!("preloading {} thumbnails in {} batches", queue.len(), batches);

        for (index, batch) in queue.chunks(batch_size).enumerate() {
            if index > 0 {
                async_delay(self.config.batch_delay).await;
            }
            let results = join_all(batch.iter().map(|(id, url)| self.cache.resolve(id, url))).await;
            for thumbnail in results {
                if thumbnail.is_fallback() {
                    outcome.fallbacks += 1;
                } else {
                    outcome.rendered += 1;
                }
            }
            log::debug!("thumbnail batch {}/{} settled", index + 1, batches);
        }

        outcome
    }
}

impl Configurable for PreloadScheduler {
    type Config = PreloadConfig;

    fn config(&self) -> &PreloadConfig {
        &self.config
    }

    fn set_config(&mut self, config: PreloadConfig) -> Result<()> {
        Self::validate_config(&config)?;
        self.config = config;
        Ok(())
    }

    fn validate_config(config: &PreloadConfig) -> Result<()> {
        if config.batch_size == 0 {
            return Err(Error::Config("preload batch size must be at least 1".into()));
        }
        Ok(())
    }
}
