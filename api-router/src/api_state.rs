use std::sync::Arc;

use async_trait::async_trait;
use common::{
    clients::{FeedReader, LibreTranslateClient},
    queue::JobQueue,
    storage::db::SurrealDbClient,
    utils::config::AppConfig,
};
use ingestion_pipeline::{ContentPipeline, FeedSync};
use retrieval_pipeline::SearchEngine;

/// A dependency reported by the health endpoint.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    fn name(&self) -> &'static str;
    async fn healthy(&self) -> bool;
}

pub struct FeedReaderProbe(pub Arc<dyn FeedReader>);

#[async_trait]
impl ServiceProbe for FeedReaderProbe {
    fn name(&self) -> &'static str {
        "miniflux"
    }

    async fn healthy(&self) -> bool {
        self.0.health_check().await
    }
}

pub struct LibreTranslateProbe(pub LibreTranslateClient);

#[async_trait]
impl ServiceProbe for LibreTranslateProbe {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    async fn healthy(&self) -> bool {
        self.0.health_check().await
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub queue: Arc<JobQueue>,
    pub pipeline: Arc<ContentPipeline>,
    pub sync: Arc<FeedSync>,
    pub search: Arc<SearchEngine>,
    pub probes: Vec<Arc<dyn ServiceProbe>>,
}

impl ApiState {
    pub fn new(
        config: &AppConfig,
        queue: Arc<JobQueue>,
        pipeline: Arc<ContentPipeline>,
        sync: Arc<FeedSync>,
        search: Arc<SearchEngine>,
    ) -> Self {
        Self {
            db: Arc::clone(queue.db()),
            config: config.clone(),
            queue,
            pipeline,
            sync,
            search,
            probes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ServiceProbe>) -> Self {
        self.probes.push(probe);
        self
    }
}
